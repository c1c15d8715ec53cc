//! Abstraction over request-scoped caches.
//!
//! Handlers can be written against [`RequestCache`] and tested with a
//! substitute instead of a full [`SessionCacheManager`](crate::SessionCacheManager).
//! `get_or_fetch` and `get_or_new` come for free from the primitives.

use crate::error::{BoxError, Error, Result};
use crate::object::ObjectRef;
use crate::session::RequestContext;

/// Request-scoped object allocation and key/value caching.
pub trait RequestCache<K, T> {
    /// Hand out a fresh object for the session.
    fn new_object(&self, ctx: &RequestContext) -> Result<ObjectRef<T>>;

    /// Store `value` under `key` for the session.
    fn put(&self, ctx: &RequestContext, key: K, value: ObjectRef<T>) -> Result<()>;

    /// Look up `key` in the session.
    fn get(&self, ctx: &RequestContext, key: &K) -> Result<Option<ObjectRef<T>>>;

    /// Whether `key` is cached in the session.
    fn exists(&self, ctx: &RequestContext, key: &K) -> Result<bool>;

    /// Remove `key` from the session. Returns whether it was present.
    fn delete(&self, ctx: &RequestContext, key: &K) -> Result<bool>;

    /// Release everything held for the session.
    fn end_session(&self, ctx: &RequestContext) -> Result<()>;

    /// Return the cached value for `key`, or fetch and cache it.
    ///
    /// Not single-flight: concurrent callers sharing a session may both fetch.
    fn get_or_fetch<F, E>(&self, ctx: &RequestContext, key: K, fetch: F) -> Result<ObjectRef<T>>
    where
        Self: Sized,
        F: FnOnce(&RequestContext) -> std::result::Result<ObjectRef<T>, E>,
        E: Into<BoxError>,
    {
        get_or_fetch(self, ctx, key, fetch)
    }

    /// Return the cached value for `key`, or initialize a new object in place and cache it.
    fn get_or_new<F, E>(&self, ctx: &RequestContext, key: K, prepare: F) -> Result<ObjectRef<T>>
    where
        Self: Sized,
        F: FnOnce(&RequestContext, &mut T) -> std::result::Result<(), E>,
        E: Into<BoxError>,
    {
        get_or_new(self, ctx, key, prepare)
    }
}

pub(crate) fn get_or_fetch<C, K, T, F, E>(
    cache: &C,
    ctx: &RequestContext,
    key: K,
    fetch: F,
) -> Result<ObjectRef<T>>
where
    C: RequestCache<K, T>,
    F: FnOnce(&RequestContext) -> std::result::Result<ObjectRef<T>, E>,
    E: Into<BoxError>,
{
    if let Some(cached) = cache.get(ctx, &key)? {
        return Ok(cached);
    }

    let obj = fetch(ctx).map_err(Error::fetch)?;
    cache.put(ctx, key, obj.clone())?;
    Ok(obj)
}

pub(crate) fn get_or_new<C, K, T, F, E>(
    cache: &C,
    ctx: &RequestContext,
    key: K,
    prepare: F,
) -> Result<ObjectRef<T>>
where
    C: RequestCache<K, T>,
    F: FnOnce(&RequestContext, &mut T) -> std::result::Result<(), E>,
    E: Into<BoxError>,
{
    if let Some(cached) = cache.get(ctx, &key)? {
        return Ok(cached);
    }

    let obj = cache.new_object(ctx)?;
    // A failed prepare leaves the object unreachable; nothing is cached
    prepare(ctx, &mut *obj.write()).map_err(Error::prepare)?;
    cache.put(ctx, key, obj.clone())?;
    Ok(obj)
}
