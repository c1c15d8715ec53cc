//! Session cache manager: per-session arenas and caches with recycling.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::arena::{ArenaRecycler, RecyclableArena};
use crate::bounded::{BoundedCache, CacheRecycler};
use crate::config::ReqCacheConfig;
use crate::error::{BoxError, Error, Result};
use crate::logger::{HitRatioLogger, Telemetry};
use crate::object::ObjectRef;
use crate::session::{RequestContext, SessionId, SessionRegistry, start_session};
use crate::store::{self, RequestCache};

type SessionCache<K, T> = BoundedCache<K, ObjectRef<T>>;

/// Request-scoped object arenas and bounded caches, keyed by session.
///
/// Each session lazily gets its own arena (on the first `new_object`) and its
/// own LRU cache (on the first `put`). Both go back to a recycler when the
/// session ends and are reset before the next session uses them.
///
/// Locking:
/// - the arena map is behind a mutex, since every `take` moves a cursor
/// - the cache map is behind a read/write lock: `get` and `exists` share it,
///   `put`, `delete` and `end_session` take it exclusively
///
/// Different sessions never share an arena or a cache. Threads sharing one
/// session race at the data level: the last `put` wins and `get_or_fetch` may
/// fetch the same key twice.
pub struct SessionCacheManager<K, T> {
    object_capacity: usize,
    cache_capacity: Option<NonZeroUsize>,
    telemetry: Option<Telemetry>,

    arenas: Mutex<HashMap<SessionId, RecyclableArena<T>>>,
    arena_recycler: ArenaRecycler<T>,

    caches: RwLock<HashMap<SessionId, SessionCache<K, T>>>,
    cache_recycler: CacheRecycler<K, ObjectRef<T>>,
}

impl<K: Hash + Eq, T: Default> SessionCacheManager<K, T> {
    /// Create a manager without a hit/miss logger.
    ///
    /// `object_capacity` is the number of arena slots per session and
    /// `cache_capacity` the number of cached entries per session. Zero disables
    /// the corresponding feature.
    pub fn new(object_capacity: usize, cache_capacity: usize) -> Result<Self> {
        Self::builder(object_capacity, cache_capacity).build()
    }

    /// Start configuring a manager.
    pub fn builder(object_capacity: usize, cache_capacity: usize) -> ManagerBuilder<K, T> {
        ManagerBuilder::from_config(ReqCacheConfig::new(object_capacity, cache_capacity))
    }

    /// Name reported to the hit/miss logger, if one is attached.
    pub fn name(&self) -> Option<&str> {
        self.telemetry.as_ref().map(Telemetry::name)
    }

    /// Start a session on `parent` that ends when the guard is dropped.
    pub fn open_session(&self, parent: &RequestContext) -> Result<SessionGuard<'_, K, T>> {
        let ctx = start_session(parent)?;
        Ok(SessionGuard {
            manager: self,
            ctx,
            ended: false,
        })
    }

    /// Hand out an object from the session's arena.
    ///
    /// Once the arena is exhausted (or when pre-allocation is disabled) a
    /// standalone object is allocated instead.
    pub fn new_object(&self, ctx: &RequestContext) -> Result<ObjectRef<T>> {
        let id = SessionRegistry::session_id(ctx)?;

        if self.object_capacity == 0 {
            self.report_object(ctx, false);
            return Ok(ObjectRef::default());
        }

        let (obj, hit) = {
            let mut arenas = self.arenas.lock();
            let arena = arenas.entry(id).or_insert_with(|| {
                trace!(session_id = %id, capacity = self.object_capacity, "Attaching arena to session");
                self.arena_recycler
                    .acquire(self.object_capacity, self.telemetry.clone())
            });
            arena.take()
        };
        self.report_object(ctx, hit);
        Ok(obj)
    }

    /// Store `value` under `key`, evicting the least recently used entry when
    /// the session's cache is full. A no-op when caching is disabled.
    pub fn put(&self, ctx: &RequestContext, key: K, value: ObjectRef<T>) -> Result<()> {
        let id = SessionRegistry::session_id(ctx)?;
        let Some(capacity) = self.cache_capacity else {
            return Ok(());
        };

        let mut caches = self.caches.write();
        let cache = caches.entry(id).or_insert_with(|| {
            trace!(session_id = %id, capacity = capacity.get(), "Attaching cache to session");
            self.cache_recycler.acquire(capacity)
        });
        cache.put(key, value);
        Ok(())
    }

    /// Look up `key` in the session's cache.
    pub fn get(&self, ctx: &RequestContext, key: &K) -> Result<Option<ObjectRef<T>>> {
        let found = self.with_cache(ctx, |cache| cache.get(key));
        self.report_cache(ctx, matches!(found, Ok(Some(_))));
        found
    }

    /// Whether `key` is cached in the session. Does not affect LRU order.
    pub fn exists(&self, ctx: &RequestContext, key: &K) -> Result<bool> {
        let found = self
            .with_cache(ctx, |cache| cache.contains(key).then_some(()))
            .map(|hit| hit.is_some());
        self.report_cache(ctx, matches!(found, Ok(true)));
        found
    }

    /// Remove `key` from the session's cache. Returns whether it was present.
    pub fn delete(&self, ctx: &RequestContext, key: &K) -> Result<bool> {
        let id = SessionRegistry::session_id(ctx)?;
        let caches = self.caches.write();
        Ok(caches.get(&id).is_some_and(|cache| cache.remove(key)))
    }

    /// Return the cached value for `key`, or call `fetch` and cache its result.
    ///
    /// A fetch error is returned as [`Error::FetchFailed`] and nothing is stored.
    pub fn get_or_fetch<F, E>(&self, ctx: &RequestContext, key: K, fetch: F) -> Result<ObjectRef<T>>
    where
        F: FnOnce(&RequestContext) -> std::result::Result<ObjectRef<T>, E>,
        E: Into<BoxError>,
    {
        store::get_or_fetch(self, ctx, key, fetch)
    }

    /// Async variant of [`get_or_fetch`](Self::get_or_fetch).
    ///
    /// No lock is held while the fetch future runs.
    pub async fn get_or_fetch_async<F, Fut, E>(
        &self,
        ctx: &RequestContext,
        key: K,
        fetch: F,
    ) -> Result<ObjectRef<T>>
    where
        F: FnOnce(RequestContext) -> Fut,
        Fut: Future<Output = std::result::Result<ObjectRef<T>, E>>,
        E: Into<BoxError>,
    {
        if let Some(cached) = self.get(ctx, &key)? {
            return Ok(cached);
        }

        let obj = fetch(ctx.clone()).await.map_err(Error::fetch)?;
        self.put(ctx, key, obj.clone())?;
        Ok(obj)
    }

    /// Return the cached value for `key`, or take a new object from the arena,
    /// initialize it with `prepare` and cache it.
    ///
    /// A prepare error is returned as [`Error::PrepareFailed`] and nothing is stored.
    pub fn get_or_new<F, E>(&self, ctx: &RequestContext, key: K, prepare: F) -> Result<ObjectRef<T>>
    where
        F: FnOnce(&RequestContext, &mut T) -> std::result::Result<(), E>,
        E: Into<BoxError>,
    {
        store::get_or_new(self, ctx, key, prepare)
    }

    /// Return the session's arena and cache to their recyclers.
    ///
    /// Ending a session twice is a no-op. Using the context afterwards starts
    /// over with an empty arena and cache.
    pub fn end_session(&self, ctx: &RequestContext) -> Result<()> {
        let id = SessionRegistry::session_id(ctx)?;

        let cache = self.caches.write().remove(&id);
        let had_cache = cache.is_some();
        if let Some(cache) = cache {
            self.cache_recycler.release(cache);
        }

        let arena = self.arenas.lock().remove(&id);
        let had_arena = arena.is_some();
        if let Some(arena) = arena {
            self.arena_recycler.release(arena);
        }

        debug!(session_id = %id, had_arena, had_cache, "Session ended");
        Ok(())
    }

    /// Manager-wide counts of live and recycled structures.
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            active_arenas: self.arenas.lock().len(),
            active_caches: self.caches.read().len(),
            idle_arenas: self.arena_recycler.idle_count(),
            idle_caches: self.cache_recycler.idle_count(),
            object_capacity: self.object_capacity,
            cache_capacity: self.cache_capacity.map_or(0, NonZeroUsize::get),
        }
    }

    /// What the session currently holds.
    pub fn session_stats(&self, ctx: &RequestContext) -> Result<SessionStats> {
        let id = SessionRegistry::session_id(ctx)?;
        let objects_taken = self.arenas.lock().get(&id).map(RecyclableArena::taken);
        let cached_entries = self.caches.read().get(&id).map(BoundedCache::len);

        Ok(SessionStats {
            has_arena: objects_taken.is_some(),
            has_cache: cached_entries.is_some(),
            objects_taken: objects_taken.unwrap_or(0),
            cached_entries: cached_entries.unwrap_or(0),
        })
    }

    fn with_cache<R>(
        &self,
        ctx: &RequestContext,
        f: impl FnOnce(&SessionCache<K, T>) -> Option<R>,
    ) -> Result<Option<R>> {
        let id = SessionRegistry::session_id(ctx)?;
        let caches = self.caches.read();
        Ok(caches.get(&id).and_then(f))
    }

    fn report_object(&self, ctx: &RequestContext, hit: bool) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.object(ctx, hit);
        }
    }

    fn report_cache(&self, ctx: &RequestContext, hit: bool) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.cache(ctx, hit);
        }
    }
}

impl<K: Hash + Eq, T: Default> RequestCache<K, T> for SessionCacheManager<K, T> {
    fn new_object(&self, ctx: &RequestContext) -> Result<ObjectRef<T>> {
        SessionCacheManager::new_object(self, ctx)
    }

    fn put(&self, ctx: &RequestContext, key: K, value: ObjectRef<T>) -> Result<()> {
        SessionCacheManager::put(self, ctx, key, value)
    }

    fn get(&self, ctx: &RequestContext, key: &K) -> Result<Option<ObjectRef<T>>> {
        SessionCacheManager::get(self, ctx, key)
    }

    fn exists(&self, ctx: &RequestContext, key: &K) -> Result<bool> {
        SessionCacheManager::exists(self, ctx, key)
    }

    fn delete(&self, ctx: &RequestContext, key: &K) -> Result<bool> {
        SessionCacheManager::delete(self, ctx, key)
    }

    fn end_session(&self, ctx: &RequestContext) -> Result<()> {
        SessionCacheManager::end_session(self, ctx)
    }
}

impl<K, T> fmt::Debug for SessionCacheManager<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCacheManager")
            .field("object_capacity", &self.object_capacity)
            .field("cache_capacity", &self.cache_capacity)
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SessionCacheManager`].
pub struct ManagerBuilder<K, T> {
    config: ReqCacheConfig,
    logger: Option<Arc<dyn HitRatioLogger>>,
    _marker: PhantomData<fn() -> (K, T)>,
}

impl<K: Hash + Eq, T: Default> ManagerBuilder<K, T> {
    /// Start from a loaded configuration.
    pub fn from_config(config: ReqCacheConfig) -> Self {
        Self {
            config,
            logger: None,
            _marker: PhantomData,
        }
    }

    /// Report hit/miss events to `logger` under `name`.
    pub fn with_logger(mut self, name: impl Into<String>, logger: Arc<dyn HitRatioLogger>) -> Self {
        self.config.name = Some(name.into());
        self.logger = Some(logger);
        self
    }

    /// Report hit/miss events to `logger` under the configured name.
    pub fn with_hit_logger(mut self, logger: Arc<dyn HitRatioLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set the name reported to the hit/miss logger.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Set how many idle arenas are kept for reuse.
    pub fn with_max_idle_arenas(mut self, max: usize) -> Self {
        self.config.max_idle_arenas = max;
        self
    }

    /// Set how many idle caches are kept for reuse.
    pub fn with_max_idle_caches(mut self, max: usize) -> Self {
        self.config.max_idle_caches = max;
        self
    }

    /// Validate the configuration and create the manager.
    pub fn build(self) -> Result<SessionCacheManager<K, T>> {
        self.config.validate(self.logger.is_some())?;

        let ReqCacheConfig {
            object_capacity,
            cache_capacity,
            name,
            max_idle_arenas,
            max_idle_caches,
        } = self.config;

        let telemetry = match (name, self.logger) {
            (Some(name), Some(logger)) => Some(Telemetry::new(Arc::from(name), logger)),
            _ => None,
        };

        Ok(SessionCacheManager {
            object_capacity,
            cache_capacity: NonZeroUsize::new(cache_capacity),
            telemetry,
            arenas: Mutex::new(HashMap::new()),
            arena_recycler: ArenaRecycler::new(max_idle_arenas),
            caches: RwLock::new(HashMap::new()),
            cache_recycler: CacheRecycler::new(max_idle_caches),
        })
    }
}

/// Guard for a session opened with [`SessionCacheManager::open_session`].
///
/// Ends the session when dropped. Call [`SessionGuard::end`] to observe the result.
pub struct SessionGuard<'a, K: Hash + Eq, T: Default> {
    manager: &'a SessionCacheManager<K, T>,
    ctx: RequestContext,
    ended: bool,
}

impl<K: Hash + Eq, T: Default> SessionGuard<'_, K, T> {
    /// The context carrying this session.
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// End the session now.
    pub fn end(mut self) -> Result<()> {
        self.ended = true;
        self.manager.end_session(&self.ctx)
    }
}

impl<K: Hash + Eq, T: Default> Drop for SessionGuard<'_, K, T> {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        if let Err(e) = self.manager.end_session(&self.ctx) {
            warn!(error = %e, "Failed to end session on drop");
        }
    }
}

/// Manager-wide statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerStats {
    /// Sessions currently holding an arena.
    pub active_arenas: usize,
    /// Sessions currently holding a cache.
    pub active_caches: usize,
    /// Arenas waiting for reuse.
    pub idle_arenas: usize,
    /// Caches waiting for reuse.
    pub idle_caches: usize,
    /// Arena slots per session.
    pub object_capacity: usize,
    /// Cached entries per session.
    pub cache_capacity: usize,
}

/// Statistics for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Whether an arena is attached.
    pub has_arena: bool,
    /// Whether a cache is attached.
    pub has_cache: bool,
    /// Arena slots handed out so far.
    pub objects_taken: usize,
    /// Entries currently cached.
    pub cached_entries: usize,
}
