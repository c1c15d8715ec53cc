//! Shared helpers for reqcache integration tests.

#![allow(dead_code)]

use anyhow::Result;
use reqcache::{RequestContext, SessionCacheManager, start_session};

/// Request-local object used across the integration tests.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Record {
    pub id: usize,
    pub payload: String,
}

pub type RecordCache = SessionCacheManager<String, Record>;

pub fn record_cache(objects: usize, entries: usize) -> Result<RecordCache> {
    Ok(SessionCacheManager::new(objects, entries)?)
}

pub fn new_session() -> Result<RequestContext> {
    Ok(start_session(&RequestContext::new())?)
}

pub fn key(i: usize) -> String {
    format!("key{i}")
}
