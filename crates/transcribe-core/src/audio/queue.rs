//! Bounded single-producer/single-consumer FIFO of audio frames between the
//! socket reader and the ASR stream driver.

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::protocol_constants::{AUDIO_QUEUE_CAPACITY, PRODUCER_BLOCK};

use super::frame::AudioFrame;

/// The queue was closed (cancellation or consumer drop) before the send
/// could complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

/// Outcome of a bounded [`AudioQueueSender::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The queue stayed full for longer than `PRODUCER_BLOCK`.
    TimedOut,
}

/// Consumer half of the queue, owned by the driver's sender loop. Dropping
/// every [`AudioQueueSender`] ends the stream: `recv` drains what is left
/// and then returns `None`, which is how `stop` reaches the driver.
pub struct AudioQueue {
    rx: mpsc::Receiver<AudioFrame>,
    cancel: CancellationToken,
}

/// Producer half, held by the session manager's audio path.
pub struct AudioQueueSender {
    tx: mpsc::Sender<AudioFrame>,
    cancel: CancellationToken,
}

/// Creates a queue pair with capacity `AUDIO_QUEUE_CAPACITY`.
pub fn audio_queue(cancel: CancellationToken) -> (AudioQueueSender, AudioQueue) {
    let (tx, rx) = mpsc::channel(AUDIO_QUEUE_CAPACITY);
    (
        AudioQueueSender {
            tx,
            cancel: cancel.clone(),
        },
        AudioQueue { rx, cancel },
    )
}

impl AudioQueue {
    /// Receives the next frame. Returns `None` on cancellation, or once the
    /// producer is dropped and the remaining frames have been drained.
    pub async fn recv(&mut self) -> Option<AudioFrame> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            frame = self.rx.recv() => frame,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl AudioQueueSender {
    /// Enqueues a frame, suspending up to `PRODUCER_BLOCK` if the queue is
    /// full. Returns `Err(QueueClosed)` on cancellation.
    pub async fn send(&self, frame: AudioFrame) -> Result<SendOutcome, QueueClosed> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(QueueClosed),
            result = timeout(PRODUCER_BLOCK, self.tx.send(frame)) => match result {
                Ok(Ok(())) => Ok(SendOutcome::Sent),
                Ok(Err(_)) => Err(QueueClosed),
                Err(_) => Ok(SendOutcome::TimedOut),
            },
        }
    }
}
