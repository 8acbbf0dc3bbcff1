//! Process-wide map of active sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::events::SessionStatus;
use crate::media::SessionId;
use crate::session::{CancelOutcome, SessionHandle};

/// Active sessions by id, used to route cancel requests.
///
/// Entries are inserted when a session starts and removed once it has reached a
/// terminal status and cleaned up. Cloning shares the same map.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<SessionId, SessionHandle>>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, handle: SessionHandle) {
        self.lock().insert(handle.id(), handle);
    }

    pub(crate) fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        self.lock().remove(&id)
    }

    /// Looks up an active session.
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.lock().get(&id).cloned()
    }

    /// Cancels a session if it is still active; unknown ids are a no-op.
    pub fn cancel(&self, id: SessionId) -> CancelOutcome {
        self.get(id).map_or(CancelOutcome::NotFound, |handle| handle.cancel())
    }

    /// Handles of every active session.
    #[must_use]
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.lock().values().cloned().collect()
    }

    /// Cancels every active session.
    pub fn cancel_all(&self) {
        for handle in self.handles() {
            handle.cancel();
        }
    }

    /// Ids and statuses of the active sessions.
    #[must_use]
    pub fn list(&self) -> Vec<(SessionId, SessionStatus)> {
        let mut entries: Vec<_> = self
            .lock()
            .values()
            .map(|handle| (handle.id(), handle.status()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    /// Number of active sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when no session is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
