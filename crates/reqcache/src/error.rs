//! Error types for request cache operations.

use crate::session::SessionId;

/// Boxed error returned by caller-supplied fetch and prepare callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for request cache operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request context carries no session identifier.
    #[error("no reqcache session in request context")]
    NoSession,

    /// A session was started on a context that already carries one.
    #[error("session {0} already exists in request context")]
    SessionAlreadyExists(SessionId),

    /// Manager configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Failed to parse a TOML configuration.
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Failed to serialize a configuration to TOML.
    #[error("failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// The fetch callback of `get_or_fetch` failed. Nothing was stored.
    #[error("fetch failed: {0}")]
    FetchFailed(#[source] BoxError),

    /// The prepare callback of `get_or_new` failed. Nothing was stored.
    #[error("prepare failed: {0}")]
    PrepareFailed(#[source] BoxError),
}

impl Error {
    /// Wrap a fetch callback error.
    pub fn fetch(err: impl Into<BoxError>) -> Self {
        Self::FetchFailed(err.into())
    }

    /// Wrap a prepare callback error.
    pub fn prepare(err: impl Into<BoxError>) -> Self {
        Self::PrepareFailed(err.into())
    }
}

/// Result type for request cache operations.
pub type Result<T> = std::result::Result<T, Error>;
