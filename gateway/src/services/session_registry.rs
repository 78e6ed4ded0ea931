//! Users are not allowed to have more than one live session: a second websocket authenticating
//! as the same user evicts the first. We need a place to look up "who currently owns this user's
//! session" that is safe to mutate from many concurrently upgrading connections.
//!
//! [`SessionRegistry`] is that place. Registration is a compare-and-swap: the caller gets back
//! whatever session used to be registered (if any) and is responsible for closing it with
//! `ConnectionReplaced`.

use std::{collections::HashMap, sync::Arc};

use gateway_types::UserId;
use parking_lot::Mutex;

use crate::metrics::METRICS_ID_SESSIONS_OPEN;

/// Process-wide mapping from [`UserId`] to the currently-live session.
#[derive(Default, Clone)]
pub(crate) struct SessionRegistry(Arc<Mutex<HashMap<UserId, SessionHandle>>>);

/// A handle to a live session, as seen by the registry and the dispatcher.
///
/// Carries a generation counter so [`SessionRegistry::unregister`] can tell whether the handle
/// being removed is still the one currently registered — a late-closing predecessor must not be
/// allowed to unregister its successor.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    pub(crate) user_id: UserId,
    pub(crate) generation: u64,
    pub(crate) sender: crate::services::session::SessionSender,
}

impl SessionRegistry {
    /// Atomically swaps in `session` for `user_id`, returning the evicted predecessor, if any.
    ///
    /// The caller must close the returned session with `PolicyViolation` + `ConnectionReplaced`.
    pub(crate) fn register(&self, session: SessionHandle) -> Option<SessionHandle> {
        let mut sessions = self.0.lock();
        let evicted = sessions.insert(session.user_id.clone(), session);
        if evicted.is_none() {
            metrics::gauge!(METRICS_ID_SESSIONS_OPEN).increment(1);
        }
        evicted
    }

    /// Removes the mapping for `user_id` only if the currently-registered session has the same
    /// `generation` as `handle`.
    ///
    /// Prevents a predecessor session that is closing late from unregistering a successor that
    /// has already replaced it.
    pub(crate) fn unregister(&self, user_id: &UserId, generation: u64) {
        let mut sessions = self.0.lock();
        if let std::collections::hash_map::Entry::Occupied(entry) = sessions.entry(user_id.clone())
            && entry.get().generation == generation
        {
            entry.remove();
            metrics::gauge!(METRICS_ID_SESSIONS_OPEN).decrement(1);
        }
    }

    /// Returns the currently-registered session for `user_id`, if any.
    pub(crate) fn lookup(&self, user_id: &UserId) -> Option<SessionHandle> {
        self.0.lock().get(user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::session::SessionSender;
    use tokio::sync::mpsc;

    fn handle(user: &str, generation: u64) -> SessionHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        SessionHandle {
            user_id: UserId::new(user),
            generation,
            sender: SessionSender::new(tx),
        }
    }

    #[test]
    fn register_returns_evicted_predecessor() {
        let registry = SessionRegistry::default();
        assert!(registry.register(handle("a", 0)).is_none());
        let evicted = registry.register(handle("a", 1));
        assert_eq!(evicted.unwrap().generation, 0);
        assert_eq!(registry.lookup(&UserId::new("a")).unwrap().generation, 1);
    }

    #[test]
    fn unregister_is_compare_and_remove() {
        let registry = SessionRegistry::default();
        registry.register(handle("a", 0));
        registry.register(handle("a", 1));
        // the stale predecessor's close handler unregisters generation 0, which must not be
        // allowed to remove the already-registered generation 1.
        registry.unregister(&UserId::new("a"), 0);
        assert_eq!(registry.lookup(&UserId::new("a")).unwrap().generation, 1);

        registry.unregister(&UserId::new("a"), 1);
        assert!(registry.lookup(&UserId::new("a")).is_none());
    }

    #[test]
    fn distinct_users_do_not_interfere() {
        let registry = SessionRegistry::default();
        registry.register(handle("a", 0));
        registry.register(handle("b", 0));
        assert!(registry.lookup(&UserId::new("a")).is_some());
        assert!(registry.lookup(&UserId::new("b")).is_some());
    }
}
