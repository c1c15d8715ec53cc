//! Session identifiers and the request context that carries them.
//!
//! A session is the logical scope of one request. [`SessionRegistry`] mints
//! identifiers from a monotonically increasing counter, so an identifier is
//! never handed out twice for the lifetime of the process, even after the
//! session that owned it has ended.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::error::{Error, Result};

/// Process-unique identifier of one in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw counter value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque per-call execution context threaded through every cache operation.
///
/// The only state it carries is the session identifier. The default value is
/// the "background" context of a process, with no session attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    session: Option<SessionId>,
}

impl RequestContext {
    /// A context with no session attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// The session carried by this context, if any.
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    fn with_session(&self, id: SessionId) -> Self {
        Self { session: Some(id) }
    }
}

/// Mints session identifiers and resolves them from request contexts.
#[derive(Debug)]
pub struct SessionRegistry {
    last_id: AtomicU64,
}

static GLOBAL_REGISTRY: SessionRegistry = SessionRegistry::new();

impl SessionRegistry {
    /// Create a registry whose first minted identifier is 1.
    pub const fn new() -> Self {
        Self {
            last_id: AtomicU64::new(0),
        }
    }

    /// The process-wide registry used by [`start_session`].
    pub fn global() -> &'static SessionRegistry {
        &GLOBAL_REGISTRY
    }

    /// Derive a child context carrying a freshly minted session identifier.
    ///
    /// Fails with [`Error::SessionAlreadyExists`] if `parent` already carries a
    /// session; the existing identifier is never overwritten.
    pub fn start_session(&self, parent: &RequestContext) -> Result<RequestContext> {
        if let Some(existing) = parent.session {
            return Err(Error::SessionAlreadyExists(existing));
        }

        let id = SessionId::from_raw(self.last_id.fetch_add(1, Ordering::Relaxed) + 1);
        trace!(session_id = %id, "Session started");
        Ok(parent.with_session(id))
    }

    /// Whether the context carries a session.
    pub fn has_session(ctx: &RequestContext) -> bool {
        ctx.session.is_some()
    }

    /// Resolve the session identifier carried by the context.
    pub fn session_id(ctx: &RequestContext) -> Result<SessionId> {
        ctx.session.ok_or(Error::NoSession)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Start a session on the process-wide registry.
///
/// Must be called once at the beginning of request processing.
pub fn start_session(parent: &RequestContext) -> Result<RequestContext> {
    SessionRegistry::global().start_session(parent)
}

/// Whether [`start_session`] has been called for this context.
pub fn has_session(ctx: &RequestContext) -> bool {
    SessionRegistry::has_session(ctx)
}

/// The session identifier carried by the context.
pub fn session_id(ctx: &RequestContext) -> Result<SessionId> {
    SessionRegistry::session_id(ctx)
}
