//! Connection registry
//!
//! Task-safe mapping from connection id to session. Every connection task
//! holds an `Arc<Registry>`; all mutation goes through `add`/`remove`, and
//! broadcast paths iterate over `snapshot`, a stable copy that is safe to use
//! while other tasks mutate the map concurrently.
//!
//! The registry tracks liveness bookkeeping only. It never owns the
//! underlying socket; that belongs to the connection's lifecycle task.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::session::Session;
use crate::types::ConnectionId;

/// Registry of live sessions
#[derive(Debug, Default)]
pub struct Registry {
    sessions: RwLock<HashMap<ConnectionId, Session>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session under its connection id
    ///
    /// A connection id maps to at most one session; ids are never reused, so
    /// an insert cannot clobber a different live session.
    pub async fn add(&self, session: Session) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id, session);
    }

    /// Remove a session, returning it if it was still present
    ///
    /// Idempotent: multiple code paths may race to clean up the same dead
    /// connection, and every call after the first is a no-op.
    pub async fn remove(&self, id: ConnectionId) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&id)
    }

    /// Stable copy of all live sessions for iteration
    ///
    /// The returned vector is unaffected by concurrent `add`/`remove` calls;
    /// a recipient that dies mid-iteration is discovered on send failure.
    pub async fn snapshot(&self) -> Vec<Session> {
        let sessions = self.sessions.read().await;
        sessions.values().cloned().collect()
    }

    /// Whether a session is registered under this id
    pub async fn contains(&self, id: ConnectionId) -> bool {
        let sessions = self.sessions.read().await;
        sessions.contains_key(&id)
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Whether no sessions are registered
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
