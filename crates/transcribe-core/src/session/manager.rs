//! The per-connection state machine wiring the audio pipeline, the stream
//! driver and the result handler together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::asr::{AsrProvider, AsrStreamDriver, DriverExit, DriverStats, EpochEvent, StreamConfig};
use crate::audio::{audio_queue, AudioFrame, AudioQueueSender, Normalizer, SendOutcome};
use crate::error::{ErrorCode, SessionError};
use crate::events::{EventEmitter, SessionEvent};
use crate::protocol_constants::{AUDIO_QUEUE_CAPACITY, DRAIN_TIMEOUT, PRODUCER_BLOCK};
use crate::result_handler::{ResultHandler, SessionIdentity};
use crate::sink::Sink;
use crate::slide::SlideMatcher;
use crate::utils::now_millis;

use super::control::StartRequest;
use super::summary::SessionSummary;

/// Where the session state machine currently sits. `Idle` covers everything
/// before `start` completes; binary payloads arriving there are normalized
/// and buffered so the first chunk can be committed the moment epoch 0 is
/// live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Stopping,
    Closed,
    Failed,
}

/// Drives one session from `start` to `session_closed`/`error`. Owns the
/// producer side of the audio queue; the consumer side is handed to the
/// spawned [`AsrStreamDriver`] task, whose exit report arrives on the
/// channel given to [`SessionHandle::idle`].
pub struct SessionHandle {
    state: SessionState,
    session_id: String,
    identity: Option<SessionIdentity>,
    normalizer: Normalizer,
    /// Frames normalized before `start` completed, waiting for the queue.
    pending_frames: Vec<AudioFrame>,
    queue_sender: Option<AudioQueueSender>,
    driver_exit_tx: mpsc::Sender<(DriverExit, DriverStats)>,
    cancel: CancellationToken,
    emitter: Arc<dyn EventEmitter>,
    started_announced: Arc<AtomicBool>,
    created_at_ms: u64,
    started_at: Option<Instant>,
}

impl SessionHandle {
    #[must_use]
    pub fn idle(
        cancel: CancellationToken,
        emitter: Arc<dyn EventEmitter>,
        driver_exit_tx: mpsc::Sender<(DriverExit, DriverStats)>,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            session_id: String::new(),
            identity: None,
            normalizer: Normalizer::start_epoch(0),
            pending_frames: Vec::new(),
            queue_sender: None,
            driver_exit_tx,
            cancel,
            emitter,
            started_announced: Arc::new(AtomicBool::new(false)),
            created_at_ms: now_millis(),
            started_at: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Handles a `start` control message: spawns the driver and the result
    /// handler, then flushes any audio buffered before `start`. The
    /// `session_started` event is not emitted here; the result handler
    /// announces it once the driver commits the first frame.
    pub async fn start(
        &mut self,
        req: StartRequest,
        provider: Arc<dyn AsrProvider>,
        sink: Arc<dyn Sink>,
        matcher: Arc<dyn SlideMatcher>,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::AlreadyActive);
        }

        self.session_id = req.session_id.clone();

        let (queue_sender, queue) = audio_queue(self.cancel.child_token());
        self.queue_sender = Some(queue_sender);

        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<EpochEvent>();

        let driver = AsrStreamDriver::new(
            provider,
            StreamConfig {
                language_code: req.language_code.clone(),
                model: req.model.clone(),
                enable_interim_results: req.enable_interim_results,
            },
        );
        let identity = SessionIdentity {
            session_id: req.session_id,
            lecture_id: req.lecture_id,
            presentation_id: req.presentation_id,
            language_code: req.language_code,
            model: req.model,
        };
        self.identity = Some(identity.clone());

        let mut handler = ResultHandler::new(
            identity,
            self.emitter.clone(),
            sink,
            matcher,
            self.started_announced.clone(),
        );
        let handler_task = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                handler.handle(event).await;
            }
        });

        let exit_tx = self.driver_exit_tx.clone();
        tokio::spawn(async move {
            let exit = driver.run(queue, events_tx).await;
            // Let the result handler flush trailing finals to the client
            // before the exit report triggers `session_closed`.
            let _ = tokio::time::timeout(DRAIN_TIMEOUT, handler_task).await;
            let _ = exit_tx.send(exit).await;
        });

        self.state = SessionState::Active;
        self.started_at = Some(Instant::now());

        let buffered = std::mem::take(&mut self.pending_frames);
        for frame in buffered {
            self.enqueue(frame).await?;
        }

        Ok(())
    }

    /// Routes one binary audio payload through the normalizer. Before
    /// `start` completes the resulting frames are buffered; once `Active`
    /// they go straight to the queue. Payloads racing a stop are dropped.
    pub async fn push_audio(&mut self, payload: Bytes) -> Result<(), SessionError> {
        if matches!(
            self.state,
            SessionState::Stopping | SessionState::Closed | SessionState::Failed
        ) {
            return Ok(());
        }

        let frames = self.normalizer.feed(payload)?;

        if self.state == SessionState::Idle {
            if self.pending_frames.len() + frames.len() > AUDIO_QUEUE_CAPACITY {
                return Err(SessionError::Backpressure(PRODUCER_BLOCK));
            }
            self.pending_frames.extend(frames);
            return Ok(());
        }

        for frame in frames {
            self.enqueue(frame).await?;
        }
        Ok(())
    }

    async fn enqueue(&self, frame: AudioFrame) -> Result<(), SessionError> {
        let Some(sender) = &self.queue_sender else {
            return Err(SessionError::Internal("audio queue not initialized".into()));
        };
        match sender.send(frame).await {
            Ok(SendOutcome::Sent) => Ok(()),
            Ok(SendOutcome::TimedOut) => Err(SessionError::Backpressure(PRODUCER_BLOCK)),
            Err(_) => Err(SessionError::NotActive),
        }
    }

    /// Handles `stop`: flushes residual audio and closes the queue. The
    /// driver drains what is queued, closes its epoch, and reports its exit;
    /// [`Self::finalize`] then emits `session_closed`.
    pub async fn begin_stop(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::NotActive);
        }
        self.state = SessionState::Stopping;

        if let (Some(flush), Some(sender)) = (self.normalizer.flush(), self.queue_sender.as_ref()) {
            let _ = sender.send(flush).await;
        }

        // Dropping the producer ends the queue once drained.
        self.queue_sender = None;
        Ok(())
    }

    /// Consumes the driver's exit report for a non-fatal exit (`stop` or
    /// idle timeout), emits `session_closed`, and returns the WebSocket
    /// close code to use.
    pub fn finalize(&mut self, exit: &DriverExit, stats: DriverStats) -> u16 {
        if matches!(self.state, SessionState::Closed | SessionState::Failed) {
            return 1000;
        }
        let status = match exit {
            DriverExit::Stopped => "completed",
            DriverExit::IdleTimeout => SessionError::IdleTimeout.code(),
            DriverExit::Failed(_) => "failed",
        };

        // A session stopped before any audio was committed still announces
        // itself, so every `session_closed` is preceded by a
        // `session_started`.
        if !self.started_announced.swap(true, Ordering::SeqCst) {
            if let Some(identity) = &self.identity {
                self.emitter.emit(SessionEvent::SessionStarted {
                    session_id: identity.session_id.clone(),
                    presentation_id: identity.presentation_id.clone(),
                    language_code: identity.language_code.clone(),
                    model: identity.model.clone(),
                });
            }
        }

        let summary = SessionSummary {
            presentation_id: self
                .identity
                .as_ref()
                .map(|i| i.presentation_id.clone())
                .unwrap_or_default(),
            created_at: self.created_at_ms,
            duration_secs: self.started_at.map_or(0, |t| t.elapsed().as_secs()),
            status: status.to_string(),
            renewal_count: stats.renewal_count,
            total_chunks_sent: stats.chunks_sent,
            total_bytes_sent: stats.bytes_sent,
            idle_secs_at_close: stats.idle_at_exit.as_secs(),
        };

        tracing::info!(
            session_id = %self.session_id,
            status,
            renewal_count = summary.renewal_count,
            total_chunks_sent = summary.total_chunks_sent,
            "session closed"
        );

        self.state = SessionState::Closed;
        self.emitter.emit(SessionEvent::SessionClosed {
            session_id: self.session_id.clone(),
            summary,
        });
        1000
    }

    /// Fails the session: cancels every task, emits the `error` event, and
    /// returns the close code. The cancellation token tears the driver and
    /// result handler down asynchronously.
    pub fn fail(&mut self, err: &SessionError) -> u16 {
        if matches!(self.state, SessionState::Closed | SessionState::Failed) {
            return err.close_code();
        }
        self.state = SessionState::Failed;
        self.cancel.cancel();

        tracing::warn!(session_id = %self.session_id, code = err.code(), error = %err, "session failed");
        self.emitter.emit(SessionEvent::Error {
            message: format!("[{}] {err}", err.code()),
        });
        err.close_code()
    }

    /// Tears the session down without emitting anything further; used when
    /// the client is already gone.
    pub fn abandon(&mut self) {
        if !matches!(self.state, SessionState::Closed | SessionState::Failed) {
            self.state = SessionState::Failed;
        }
        self.cancel.cancel();
    }
}
