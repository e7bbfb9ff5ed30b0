//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for the result handler and session manager to
//!   emit session events without depending on the WebSocket transport
//! - [`SessionEvent`], the tagged event sent to exactly one client per session
//!
//! The actual transport implementation (serializing to a WebSocket text
//! frame) lives in [`crate::api::ws`] via [`bridge::SessionEventBridge`].

mod bridge;
mod emitter;

pub use bridge::SessionEventBridge;
pub use emitter::EventEmitter;

use serde::Serialize;

use crate::result_handler::TranscriptionResult;
use crate::session::SessionSummary;

/// Events sent to the client over `/ws/transcribe`, one stream per session.
///
/// Unlike a broadcast of shared state to many subscribers, each session has
/// exactly one audience: the WebSocket that owns it. The tag matches the
/// wire-level `event` field directly.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Emitted once, after the first audio frame has been committed to the
    /// provider on epoch 0.
    SessionStarted {
        session_id: String,
        presentation_id: String,
        language_code: String,
        model: String,
    },
    /// A published interim or final transcription result.
    Transcription { result: TranscriptionResult },
    /// Emitted once, as the session transitions to `Closed`.
    SessionClosed {
        session_id: String,
        summary: SessionSummary,
    },
    /// A protocol or fatal error. Fatal errors are followed by a WebSocket
    /// close using the error's close code.
    Error { message: String },
}
