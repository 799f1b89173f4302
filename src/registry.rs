//! Registry of live sessions.
//!
//! `SessionRegistry` stores non-owning [`WeakSession`] references so
//! application code can reach live sessions (for example to broadcast)
//! without keeping finished ones alive. Dead entries are pruned
//! opportunistically or lazily at lookup time.

use dashmap::DashMap;

use crate::session::{Session, SessionId, WeakSession};

/// Concurrent registry of sessions keyed by [`SessionId`].
#[derive(Debug, Default)]
pub struct SessionRegistry(DashMap<SessionId, WeakSession>);

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Retrieve the session for `id` if it is still alive.
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        let guard = self.0.get(id);
        let session = guard.as_ref().and_then(|weak| weak.upgrade());
        drop(guard);
        if session.is_none() {
            self.0.remove_if(id, |_, weak| weak.is_dead());
        }
        session
    }

    /// Track a newly opened session.
    pub fn insert(&self, session: &Session) { self.0.insert(session.id(), session.downgrade()); }

    /// Stop tracking a session, typically on teardown.
    pub fn remove(&self, id: &SessionId) { self.0.remove(id); }

    /// Number of tracked entries, dead ones included.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether no entries are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Remove all stale weak references without returning any sessions.
    ///
    /// `DashMap::retain` acquires per-bucket write locks, so other operations
    /// may contend briefly while the registry is pruned.
    pub fn prune(&self) { self.0.retain(|_, weak| !weak.is_dead()); }

    /// Prune stale weak references, then collect the remaining live sessions.
    ///
    /// This holds per-bucket write locks while iterating. Use [`prune`] from a
    /// maintenance task when only cleanup is required.
    ///
    /// [`prune`]: Self::prune
    #[must_use]
    pub fn active_sessions(&self) -> Vec<Session> {
        let mut sessions = Vec::with_capacity(self.0.len());
        self.0.retain(|_, weak| {
            if let Some(session) = weak.upgrade() {
                sessions.push(session);
                true
            } else {
                false
            }
        });
        sessions
    }

    /// Prune stale weak references, then return the IDs of the live sessions.
    #[must_use]
    pub fn active_ids(&self) -> Vec<SessionId> {
        let mut ids = Vec::with_capacity(self.0.len());
        self.0.retain(|id, weak| {
            if weak.is_dead() {
                false
            } else {
                ids.push(*id);
                true
            }
        });
        ids
    }

    /// Send `text` to every live OPEN session, returning how many accepted it.
    pub fn broadcast_text(&self, text: &str) -> usize {
        self.active_sessions()
            .iter()
            .filter(|session| session.send_text_data(text))
            .count()
    }
}
