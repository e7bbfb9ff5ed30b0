//! A single underlying provider stream, and the events it produces.

use std::time::Instant;

use tokio::task::JoinHandle;

use super::provider::{AsrSink, ProviderEvent};
use crate::error::SessionError;

/// One event from the driver, tagged with the epoch that produced it so the
/// result handler can scope its dedup state to one stream and reset it
/// across a renewal boundary.
pub struct EpochEvent {
    pub epoch_index: u64,
    pub outcome: EpochOutcome,
}

pub enum EpochOutcome {
    Event(ProviderEvent),
    /// The first audio frame of the session was successfully written to the
    /// provider. Emitted exactly once, before any `Event` can arrive.
    Committed,
    /// Clean end-of-stream; the epoch's receiver task has exited.
    Eof,
    /// Transport-level failure reading the response stream.
    Error(SessionError),
}

/// A live epoch: the write half plus a handle to the background task
/// draining the read half into the shared event channel.
pub struct Epoch {
    pub index: u64,
    pub started_at: Instant,
    pub sink: Box<dyn AsrSink>,
    pub receiver_task: JoinHandle<()>,
}

impl Epoch {
    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}
