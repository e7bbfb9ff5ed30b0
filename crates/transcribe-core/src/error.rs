//! Centralized error types for the transcription session core.
//!
//! Defines the `kXxx` error taxonomy clients branch on, maps each variant
//! to a WebSocket close code where applicable, and implements `Serialize` so
//! the same enum can be rendered directly as the payload of an `error` event.

use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide a machine-readable error code, matching
/// the taxonomy clients are expected to branch on.
pub trait ErrorCode {
    /// Returns the `kXxx` code for this error.
    fn code(&self) -> &'static str;
}

/// Whether an error ends the session or is reported and swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Reported as an `error` event; the socket and session stay open.
    Protocol,
    /// Reported as an `error` event, then the socket is closed.
    Fatal,
}

/// Application-wide error type for the transcription session core.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "code", content = "message")]
pub enum SessionError {
    /// Malformed or unparseable control message.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// `start` received while a session is already `Active`.
    #[error("session already active")]
    AlreadyActive,

    /// `stop` (or audio) received while no session is `Active`.
    #[error("session not active")]
    NotActive,

    /// Misaligned or otherwise unsupported PCM payload.
    #[error("audio format error: {0}")]
    AudioFormat(String),

    /// Producer blocked on a full Audio Queue past its budget.
    #[error("backpressure: producer blocked past {0:?}")]
    Backpressure(std::time::Duration),

    /// No audio received within the silence limit.
    #[error("idle timeout")]
    IdleTimeout,

    /// Provider unreachable after a retry.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Missing or invalid provider credentials.
    #[error("provider auth error: {0}")]
    ProviderAuth(String),

    /// Uncategorized internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "kBadRequest",
            Self::AlreadyActive => "kAlreadyActive",
            Self::NotActive => "kNotActive",
            Self::AudioFormat(_) => "kAudioFormat",
            Self::Backpressure(_) => "kBackpressure",
            Self::IdleTimeout => "kIdleTimeout",
            Self::ProviderUnavailable(_) => "kProviderUnavailable",
            Self::ProviderAuth(_) => "kProviderAuth",
            Self::Internal(_) => "kInternal",
        }
    }
}

impl SessionError {
    /// How this error should be handled by the Session Manager.
    pub fn severity(&self) -> Severity {
        match self {
            Self::BadRequest(_) | Self::AlreadyActive | Self::NotActive => Severity::Protocol,
            Self::IdleTimeout => Severity::Fatal, // graceful stop, still terminal
            Self::AudioFormat(_)
            | Self::Backpressure(_)
            | Self::ProviderUnavailable(_)
            | Self::ProviderAuth(_)
            | Self::Internal(_) => Severity::Fatal,
        }
    }

    /// WebSocket close code to use when this error ends the session.
    ///
    /// Protocol misuse closes with `1008` (policy violation) in the rare
    /// case it is terminal at all. `IdleTimeout` ends the session but is
    /// neither a policy violation nor an internal failure, so the socket
    /// closes normally (`1000`) after the `session_closed` event.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) | Self::AlreadyActive | Self::NotActive => 1008,
            Self::IdleTimeout => 1000,
            Self::ProviderAuth(_) => 1011,
            Self::AudioFormat(_) | Self::Backpressure(_) | Self::ProviderUnavailable(_) => 1011,
            Self::Internal(_) => 1011,
        }
    }
}

/// Convenient Result alias for session-core operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_format_is_fatal_with_internal_close_code() {
        let err = SessionError::AudioFormat("odd byte length".into());
        assert_eq!(err.code(), "kAudioFormat");
        assert_eq!(err.severity(), Severity::Fatal);
        assert_eq!(err.close_code(), 1011);
    }

    #[test]
    fn already_active_is_protocol_level() {
        let err = SessionError::AlreadyActive;
        assert_eq!(err.code(), "kAlreadyActive");
        assert_eq!(err.severity(), Severity::Protocol);
    }

    #[test]
    fn idle_timeout_closes_normally() {
        let err = SessionError::IdleTimeout;
        assert_eq!(err.code(), "kIdleTimeout");
        assert_eq!(err.severity(), Severity::Fatal);
        assert_eq!(err.close_code(), 1000);
    }
}
