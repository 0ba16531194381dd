use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

/// Tracks which users currently have live sessions.
///
/// A user may hold several sessions at once (tabs, devices). The map itself
/// is never handed out; callers only connect, disconnect and query.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session. Returns `false` if it was already registered.
    pub fn connect(&self, user_id: Uuid, session_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let inserted = sessions.entry(user_id).or_default().insert(session_id);
        if inserted {
            tracing::debug!("Session {} connected for user {}", session_id, user_id);
        }
        inserted
    }

    /// Removes a session, dropping the user entry once its last session goes.
    /// Returns `false` if the session was unknown.
    pub fn disconnect(&self, user_id: Uuid, session_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let Some(user_sessions) = sessions.get_mut(&user_id) else {
            return false;
        };

        let removed = user_sessions.remove(&session_id);
        if user_sessions.is_empty() {
            sessions.remove(&user_id);
        }
        if removed {
            tracing::debug!("Session {} disconnected for user {}", session_id, user_id);
        }
        removed
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&user_id)
    }

    /// Snapshot of the user's sessions, sorted for stable output.
    pub fn sessions_for(&self, user_id: Uuid) -> Vec<Uuid> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<Uuid> = sessions
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Number of users with at least one live session.
    pub fn online_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
