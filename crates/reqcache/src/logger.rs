//! Hit/miss telemetry hooks.
//!
//! The manager reports one event per `new_object` call (arena slot reused or
//! standalone allocation) and one per `get`/`exists` call (cache hit or miss).
//! Plug in any [`HitRatioLogger`] to export them; [`TracingHitLogger`] and
//! [`HitRatioCounter`] cover the common cases.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::session::RequestContext;

/// Receiver for object pool and cache hit/miss events.
pub trait HitRatioLogger: Send + Sync {
    /// Called once per `new_object`. `hit` is false when the arena was exhausted
    /// or disabled and a standalone object was allocated.
    fn log_object_pool_hit_ratio(&self, ctx: &RequestContext, name: &str, hit: bool);

    /// Called once per `get` or `exists`.
    fn log_cache_hit_ratio(&self, ctx: &RequestContext, name: &str, hit: bool);
}

/// Emits every event as a `trace` level tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHitLogger;

impl HitRatioLogger for TracingHitLogger {
    fn log_object_pool_hit_ratio(&self, ctx: &RequestContext, name: &str, hit: bool) {
        tracing::trace!(
            session_id = ?ctx.session().map(|id| id.as_u64()),
            name = %name,
            hit,
            "Object pool access"
        );
    }

    fn log_cache_hit_ratio(&self, ctx: &RequestContext, name: &str, hit: bool) {
        tracing::trace!(
            session_id = ?ctx.session().map(|id| id.as_u64()),
            name = %name,
            hit,
            "Cache access"
        );
    }
}

/// Lock-free hit/miss counters.
#[derive(Debug, Default)]
pub struct HitRatioCounter {
    object_hits: AtomicU64,
    object_misses: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl HitRatioCounter {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read all counters.
    pub fn snapshot(&self) -> HitRatioSnapshot {
        HitRatioSnapshot {
            object_hits: self.object_hits.load(Ordering::Relaxed),
            object_misses: self.object_misses.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.object_hits.store(0, Ordering::Relaxed);
        self.object_misses.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
    }
}

impl HitRatioLogger for HitRatioCounter {
    fn log_object_pool_hit_ratio(&self, _ctx: &RequestContext, _name: &str, hit: bool) {
        let counter = if hit {
            &self.object_hits
        } else {
            &self.object_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn log_cache_hit_ratio(&self, _ctx: &RequestContext, _name: &str, hit: bool) {
        let counter = if hit {
            &self.cache_hits
        } else {
            &self.cache_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of a [`HitRatioCounter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HitRatioSnapshot {
    /// `new_object` calls served from the arena.
    pub object_hits: u64,
    /// `new_object` calls that allocated a standalone object.
    pub object_misses: u64,
    /// `get`/`exists` calls that found the key.
    pub cache_hits: u64,
    /// `get`/`exists` calls that did not.
    pub cache_misses: u64,
}

impl HitRatioSnapshot {
    /// Fraction of `new_object` calls served from the arena, if any were made.
    pub fn object_hit_ratio(&self) -> Option<f64> {
        ratio(self.object_hits, self.object_misses)
    }

    /// Fraction of cache lookups that hit, if any were made.
    pub fn cache_hit_ratio(&self) -> Option<f64> {
        ratio(self.cache_hits, self.cache_misses)
    }
}

fn ratio(hits: u64, misses: u64) -> Option<f64> {
    let total = hits + misses;
    (total > 0).then(|| hits as f64 / total as f64)
}

/// A named logger attached to a manager and, while a session runs, to its arena.
#[derive(Clone)]
pub(crate) struct Telemetry {
    name: Arc<str>,
    logger: Arc<dyn HitRatioLogger>,
}

impl Telemetry {
    pub(crate) fn new(name: Arc<str>, logger: Arc<dyn HitRatioLogger>) -> Self {
        Self { name, logger }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn object(&self, ctx: &RequestContext, hit: bool) {
        self.logger.log_object_pool_hit_ratio(ctx, &self.name, hit);
    }

    pub(crate) fn cache(&self, ctx: &RequestContext, hit: bool) {
        self.logger.log_cache_hit_ratio(ctx, &self.name, hit);
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_tracks_hits_and_misses() {
        let counter = HitRatioCounter::new();
        let ctx = RequestContext::new();

        counter.log_object_pool_hit_ratio(&ctx, "test", true);
        counter.log_object_pool_hit_ratio(&ctx, "test", false);
        counter.log_cache_hit_ratio(&ctx, "test", true);
        counter.log_cache_hit_ratio(&ctx, "test", true);
        counter.log_cache_hit_ratio(&ctx, "test", true);
        counter.log_cache_hit_ratio(&ctx, "test", false);

        let snap = counter.snapshot();
        assert_eq!(
            snap,
            HitRatioSnapshot {
                object_hits: 1,
                object_misses: 1,
                cache_hits: 3,
                cache_misses: 1,
            }
        );
        assert_eq!(snap.object_hit_ratio(), Some(0.5));
        assert_eq!(snap.cache_hit_ratio(), Some(0.75));
    }

    #[test]
    fn test_ratio_without_events() {
        let snap = HitRatioSnapshot::default();
        assert_eq!(snap.object_hit_ratio(), None);
        assert_eq!(snap.cache_hit_ratio(), None);
    }

    #[test]
    fn test_reset() {
        let counter = HitRatioCounter::new();
        counter.log_cache_hit_ratio(&RequestContext::new(), "test", false);
        counter.reset();
        assert_eq!(counter.snapshot(), HitRatioSnapshot::default());
    }

    #[test]
    fn test_telemetry_forwards_name() {
        let counter = Arc::new(HitRatioCounter::new());
        let telemetry = Telemetry::new(Arc::from("orders"), counter.clone());

        assert_eq!(telemetry.name(), "orders");
        telemetry.object(&RequestContext::new(), true);
        telemetry.cache(&RequestContext::new(), false);

        let snap = counter.snapshot();
        assert_eq!(snap.object_hits, 1);
        assert_eq!(snap.cache_misses, 1);
    }
}
