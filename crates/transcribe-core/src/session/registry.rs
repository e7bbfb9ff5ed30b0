//! Tracks active sessions and enforces `SESSION_MAX`.
//!
//! Modeled on the connection-tracking/RAII-guard split used elsewhere for
//! WebSocket lifecycles: callers register a session id up front and receive a
//! guard whose `Drop` unregisters it, so a session that panics or is dropped
//! early never leaks a registry slot.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashSet;

/// Returned when the registry is already at `SESSION_MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityExceeded;

/// Tracks session ids currently in flight, bounded by `max_sessions`.
pub struct SessionRegistry {
    active: DashSet<String>,
    max_sessions: usize,
    count: AtomicUsize,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(max_sessions: usize) -> Self {
        Self {
            active: DashSet::new(),
            max_sessions,
            count: AtomicUsize::new(0),
        }
    }

    /// Reserves a slot for `session_id`. Fails with [`CapacityExceeded`] if
    /// the registry is full or `session_id` is already registered.
    pub fn register(
        self: &Arc<Self>,
        session_id: String,
    ) -> Result<SessionGuard, CapacityExceeded> {
        loop {
            let current = self.count.load(Ordering::SeqCst);
            if current >= self.max_sessions {
                return Err(CapacityExceeded);
            }
            if self
                .count
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }

        if !self.active.insert(session_id.clone()) {
            self.count.fetch_sub(1, Ordering::SeqCst);
            return Err(CapacityExceeded);
        }

        Ok(SessionGuard {
            session_id,
            registry: Arc::clone(self),
        })
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Whether a new connection should be refused outright. Advisory only;
    /// [`Self::register`] is the authoritative check.
    #[must_use]
    pub fn at_capacity(&self) -> bool {
        self.active_count() >= self.max_sessions
    }

    fn unregister(&self, session_id: &str) {
        if self.active.remove(session_id).is_some() {
            self.count.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// RAII handle releasing a session's registry slot when dropped.
pub struct SessionGuard {
    session_id: String,
    registry: Arc<SessionRegistry>,
}

impl SessionGuard {
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_up_to_capacity_then_rejects() {
        let registry = Arc::new(SessionRegistry::new(2));
        let a = registry.register("a".into()).unwrap();
        let _b = registry.register("b".into()).unwrap();
        assert_eq!(registry.active_count(), 2);
        assert!(registry.register("c".into()).is_err());
        drop(a);
        assert_eq!(registry.active_count(), 1);
        assert!(registry.register("c".into()).is_ok());
    }

    #[test]
    fn duplicate_session_id_is_rejected() {
        let registry = Arc::new(SessionRegistry::new(4));
        let _a = registry.register("dup".into()).unwrap();
        assert!(registry.register("dup".into()).is_err());
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn drop_releases_the_slot() {
        let registry = Arc::new(SessionRegistry::new(1));
        {
            let _guard = registry.register("solo".into()).unwrap();
            assert_eq!(registry.active_count(), 1);
        }
        assert_eq!(registry.active_count(), 0);
    }
}
