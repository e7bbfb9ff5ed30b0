//! Event emitter abstraction for decoupling services from transport.
//!
//! The result handler and session manager depend on the [`EventEmitter`]
//! trait rather than a concrete WebSocket sender, which is what lets the
//! renewal, rate-limiting and slide-match logic be unit tested without a
//! live socket.

use super::SessionEvent;

/// Trait for emitting session events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits one session event.
    fn emit(&self, event: SessionEvent);
}
