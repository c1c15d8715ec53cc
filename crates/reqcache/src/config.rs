//! Configuration for the session cache manager.
//!
//! ```toml
//! object_capacity = 256   # arena slots per session, 0 disables pre-allocation
//! cache_capacity = 64     # cached entries per session, 0 disables caching
//! name = "orders"         # label passed to the hit/miss logger
//! max_idle_arenas = 1024
//! max_idle_caches = 1024
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of idle arenas and caches kept for reuse.
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// Capacities and recycling limits of a [`SessionCacheManager`](crate::SessionCacheManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReqCacheConfig {
    /// Arena slots pre-allocated per session. Zero disables pre-allocation.
    pub object_capacity: usize,

    /// Entries cached per session before LRU eviction. Zero disables caching.
    pub cache_capacity: usize,

    /// Name reported to the hit/miss logger. Required when a logger is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Idle arenas kept for reuse by future sessions.
    pub max_idle_arenas: usize,

    /// Idle caches kept for reuse by future sessions.
    pub max_idle_caches: usize,
}

impl Default for ReqCacheConfig {
    fn default() -> Self {
        Self {
            object_capacity: 0,
            cache_capacity: 0,
            name: None,
            max_idle_arenas: DEFAULT_MAX_IDLE,
            max_idle_caches: DEFAULT_MAX_IDLE,
        }
    }
}

impl ReqCacheConfig {
    /// Create a configuration with the given capacities.
    pub fn new(object_capacity: usize, cache_capacity: usize) -> Self {
        Self {
            object_capacity,
            cache_capacity,
            ..Self::default()
        }
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Set the name reported to the hit/miss logger.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set how many idle arenas are kept for reuse.
    pub fn with_max_idle_arenas(mut self, max: usize) -> Self {
        self.max_idle_arenas = max;
        self
    }

    /// Set how many idle caches are kept for reuse.
    pub fn with_max_idle_caches(mut self, max: usize) -> Self {
        self.max_idle_caches = max;
        self
    }

    /// Check the configuration, given whether a hit/miss logger will be attached.
    pub fn validate(&self, has_logger: bool) -> Result<()> {
        let named = self.name.as_deref().is_some_and(|name| !name.is_empty());
        if has_logger && !named {
            return Err(Error::InvalidConfiguration(
                "name must be set when a logger is provided".to_string(),
            ));
        }
        Ok(())
    }
}
