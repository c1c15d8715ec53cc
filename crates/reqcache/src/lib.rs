//! Request-scoped object arenas and bounded caches.
//!
//! Server processes handling many short, concurrent requests can use this
//! crate to:
//! - hand out request-local objects from a pre-allocated, recycled arena
//!   instead of allocating each one
//! - memoize values per request in a bounded LRU cache
//!
//! Every request runs in a session. The arena and cache of a session are
//! attached lazily and go back to a recycler when the session ends, ready for
//! the next request.
//!
//! # Example
//!
//! ```no_run
//! use reqcache::{BoxError, ObjectRef, RequestContext, SessionCacheManager};
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     id: String,
//!     name: String,
//! }
//!
//! fn load_user(id: &str) -> Result<ObjectRef<User>, BoxError> {
//!     Ok(ObjectRef::new(User {
//!         id: id.to_string(),
//!         name: "Ada".to_string(),
//!     }))
//! }
//!
//! fn main() -> reqcache::Result<()> {
//!     let cache: SessionCacheManager<String, User> = SessionCacheManager::new(256, 64)?;
//!
//!     let session = cache.open_session(&RequestContext::new())?;
//!     let ctx = session.context();
//!
//!     let user_id = "42".to_string();
//!     let user = cache.get_or_fetch(ctx, user_id.clone(), |_| load_user(&user_id))?;
//!     let scratch = cache.new_object(ctx)?;
//!     scratch.write().name = user.read().name.clone();
//!     // session ends when `session` is dropped
//!     Ok(())
//! }
//! ```

mod arena;
mod bounded;
mod config;
mod error;
mod logger;
mod manager;
mod object;
mod session;
mod store;

pub use config::{DEFAULT_MAX_IDLE, ReqCacheConfig};
pub use error::{BoxError, Error, Result};
pub use logger::{HitRatioCounter, HitRatioLogger, HitRatioSnapshot, TracingHitLogger};
pub use manager::{ManagerBuilder, ManagerStats, SessionCacheManager, SessionGuard, SessionStats};
pub use object::ObjectRef;
pub use session::{
    RequestContext, SessionId, SessionRegistry, has_session, session_id, start_session,
};
pub use store::RequestCache;
