//! Audio ingestion pipeline: normalization and the bounded frame queue.

mod frame;
mod normalizer;
mod queue;

pub use frame::AudioFrame;
pub use normalizer::Normalizer;
pub use queue::{audio_queue, AudioQueue, AudioQueueSender, QueueClosed, SendOutcome};
