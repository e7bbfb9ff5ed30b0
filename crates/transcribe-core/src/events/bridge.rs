//! Bridge implementation that maps session events to the WebSocket transport.
//!
//! One [`SessionEventBridge`] is constructed per session. It is the single
//! `EventEmitter` both the result handler and the session manager write to;
//! the WebSocket write loop in [`crate::api::ws`] owns the receiving half
//! and is the only task that touches the socket.

use tokio::sync::mpsc;

use super::{EventEmitter, SessionEvent};

/// Bridges domain events to a session's WebSocket write loop.
///
/// A `broadcast` channel is the wrong tool here: a session has exactly one
/// subscriber for its whole lifetime, and `broadcast`'s lagged-receiver
/// semantics would silently drop transcription results under load. An
/// unbounded `mpsc` delivers every final to the one reader that exists.
#[derive(Clone)]
pub struct SessionEventBridge {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionEventBridge {
    /// Creates a bridge and returns the receiving half for the WebSocket
    /// write loop to drain.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventEmitter for SessionEventBridge {
    fn emit(&self, event: SessionEvent) {
        // The receiver is dropped once the WebSocket write loop exits during
        // session teardown; a send failure past that point is expected, not
        // an error worth surfacing.
        let _ = self.tx.send(event);
    }
}
