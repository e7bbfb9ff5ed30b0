//! Summary attached to the `session_closed` event.

use serde::Serialize;

/// Statistics gathered over a session's lifetime, published once on close.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub presentation_id: String,
    /// Wall-clock creation time, Unix milliseconds.
    pub created_at: u64,
    pub duration_secs: u64,
    /// `"completed"` for a clean stop, or the error code of the graceful
    /// terminal condition (`"kIdleTimeout"`).
    pub status: String,
    pub renewal_count: u32,
    pub total_chunks_sent: u64,
    pub total_bytes_sent: u64,
    /// Seconds since the last audio frame, measured at close.
    pub idle_secs_at_close: u64,
}
