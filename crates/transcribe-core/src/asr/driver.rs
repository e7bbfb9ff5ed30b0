//! The ASR stream driver: owns exactly one live provider stream per session
//! and renews it before the provider's hard time limit without losing audio.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::audio::AudioQueue;
use crate::error::SessionError;
use crate::protocol_constants::{
    DRAIN_TIMEOUT, EPOCH_HARD_LIMIT, EPOCH_SOFT_LIMIT, PROVIDER_RETRY_WINDOW, SILENCE_LIMIT,
};

use super::epoch::{Epoch, EpochEvent, EpochOutcome};
use super::provider::{AsrProvider, StreamConfig};

/// Why [`AsrStreamDriver::run`] returned.
#[derive(Debug)]
pub enum DriverExit {
    /// The producer side closed the queue (`stop` or session teardown) and
    /// the final epoch was drained cleanly.
    Stopped,
    /// No audio was consumed from the queue for longer than `SILENCE_LIMIT`.
    IdleTimeout,
    Failed(SessionError),
}

/// Counters gathered while the driver ran, folded into the session summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverStats {
    pub renewal_count: u32,
    pub chunks_sent: u64,
    pub bytes_sent: u64,
    /// Time since the last non-empty frame, measured at exit.
    pub idle_at_exit: Duration,
}

/// Drives one session's worth of epochs. One instance is created per session
/// by the session manager and consumed by [`Self::run`].
pub struct AsrStreamDriver {
    provider: Arc<dyn AsrProvider>,
    config: StreamConfig,
}

impl AsrStreamDriver {
    pub fn new(provider: Arc<dyn AsrProvider>, config: StreamConfig) -> Self {
        Self { provider, config }
    }

    /// Consumes `queue`, forwards frames to the current epoch, performs
    /// renewal, and publishes every response (tagged with its originating
    /// epoch index) on `events_tx`. Returns once the queue ends, silence or
    /// cancellation is detected, or a fatal provider failure occurs.
    pub async fn run(
        self,
        mut queue: AudioQueue,
        events_tx: mpsc::UnboundedSender<EpochEvent>,
    ) -> (DriverExit, DriverStats) {
        let mut stats = DriverStats::default();
        let mut last_audio_at = Instant::now();
        let mut last_failure_at: Option<Instant> = None;
        let mut committed = false;

        let mut current = match self.open_epoch(0, events_tx.clone()).await {
            Ok(epoch) => epoch,
            Err(err) => return (DriverExit::Failed(err), stats),
        };

        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let exit = loop {
            tokio::select! {
                biased;

                _ = ticker.tick() => {
                    if last_audio_at.elapsed() > SILENCE_LIMIT {
                        self.close_epoch(current, DRAIN_TIMEOUT).await;
                        break DriverExit::IdleTimeout;
                    }

                    if current.age() >= EPOCH_SOFT_LIMIT {
                        // The replacement stream must be live before the
                        // provider kills the current one at the hard limit;
                        // a renewal that cannot beat that deadline is fatal.
                        let budget = EPOCH_HARD_LIMIT.saturating_sub(current.age());
                        match tokio::time::timeout(budget, self.renew(current, events_tx.clone()))
                            .await
                        {
                            Ok(Ok(next)) => {
                                current = next;
                                stats.renewal_count += 1;
                            }
                            Ok(Err(err)) => break DriverExit::Failed(err),
                            Err(_) => {
                                break DriverExit::Failed(SessionError::ProviderUnavailable(
                                    "stream renewal did not complete before the provider's hard limit"
                                        .into(),
                                ));
                            }
                        }
                    }
                }

                frame = queue.recv() => {
                    let Some(frame) = frame else {
                        // Producer dropped (stop) or cancellation. On cancel
                        // the socket is already going away, so the epoch is
                        // aborted rather than drained.
                        let drain = if queue.is_cancelled() {
                            Duration::ZERO
                        } else {
                            DRAIN_TIMEOUT
                        };
                        self.close_epoch(current, drain).await;
                        break DriverExit::Stopped;
                    };

                    if !frame.is_empty() {
                        last_audio_at = Instant::now();
                    }

                    if let Err(err) = current.sink.send_audio(&frame.bytes).await {
                        let now = Instant::now();
                        let repeat_failure = last_failure_at
                            .is_some_and(|t| now.duration_since(t) < PROVIDER_RETRY_WINDOW);
                        last_failure_at = Some(now);

                        if repeat_failure {
                            current.receiver_task.abort();
                            break DriverExit::Failed(SessionError::ProviderUnavailable(
                                err.to_string(),
                            ));
                        }

                        tracing::warn!(error = %err, "provider transport error, attempting renewal");
                        match self.renew(current, events_tx.clone()).await {
                            Ok(next) => {
                                current = next;
                                stats.renewal_count += 1;
                            }
                            Err(err) => break DriverExit::Failed(err),
                        }

                        // The failed frame was never written to any stream;
                        // it goes to the replacement epoch.
                        if let Err(err) = current.sink.send_audio(&frame.bytes).await {
                            current.receiver_task.abort();
                            break DriverExit::Failed(SessionError::ProviderUnavailable(
                                err.to_string(),
                            ));
                        }
                    }

                    stats.chunks_sent += 1;
                    stats.bytes_sent += frame.len() as u64;

                    if !committed {
                        committed = true;
                        let _ = events_tx.send(EpochEvent {
                            epoch_index: current.index,
                            outcome: EpochOutcome::Committed,
                        });
                    }
                }
            }
        };

        stats.idle_at_exit = last_audio_at.elapsed();
        (exit, stats)
    }

    async fn open_epoch(
        &self,
        index: u64,
        events_tx: mpsc::UnboundedSender<EpochEvent>,
    ) -> Result<Epoch, SessionError> {
        let (sink, mut source) = self.provider.open_stream(self.config.clone()).await?;

        let receiver_task = tokio::spawn(async move {
            loop {
                let outcome = match source.recv().await {
                    Ok(Some(event)) => EpochOutcome::Event(event),
                    Ok(None) => EpochOutcome::Eof,
                    Err(err) => EpochOutcome::Error(err),
                };
                let is_terminal = matches!(outcome, EpochOutcome::Eof | EpochOutcome::Error(_));
                if events_tx
                    .send(EpochEvent {
                        epoch_index: index,
                        outcome,
                    })
                    .is_err()
                    || is_terminal
                {
                    break;
                }
            }
        });

        Ok(Epoch {
            index,
            started_at: Instant::now(),
            sink,
            receiver_task,
        })
    }

    /// Opens the replacement epoch, swaps it in, and leaves the old epoch's
    /// receiver task running detached to drain its pending results; the
    /// result handler observes those on `events_tx` tagged with the old
    /// index.
    async fn renew(
        &self,
        mut old: Epoch,
        events_tx: mpsc::UnboundedSender<EpochEvent>,
    ) -> Result<Epoch, SessionError> {
        match self.open_epoch(old.index + 1, events_tx).await {
            Ok(next) => {
                old.sink.close().await;
                // `old.receiver_task` is intentionally dropped rather than
                // awaited: it keeps running and publishing trailing finals
                // until the provider sends EOF.
                Ok(next)
            }
            Err(err) => {
                old.receiver_task.abort();
                Err(err)
            }
        }
    }

    async fn close_epoch(&self, mut epoch: Epoch, drain_timeout: Duration) {
        epoch.sink.close().await;
        if drain_timeout.is_zero() {
            epoch.receiver_task.abort();
            return;
        }
        if tokio::time::timeout(drain_timeout, epoch.receiver_task)
            .await
            .is_err()
        {
            tracing::warn!(epoch = epoch.index, "receiver task did not drain in time");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::provider::{AsrSink, AsrSource, ProviderEvent};
    use crate::audio::{audio_queue, AudioFrame};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct FakeSink {
        sent: Arc<AtomicU64>,
        fail_sends: Arc<AtomicBool>,
    }

    #[async_trait]
    impl AsrSink for FakeSink {
        async fn send_audio(&mut self, frame: &[u8]) -> Result<(), SessionError> {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(SessionError::ProviderUnavailable("connection reset".into()));
            }
            self.sent.fetch_add(frame.len() as u64, Ordering::SeqCst);
            Ok(())
        }
        async fn close(&mut self) {}
    }

    struct FakeSource;

    #[async_trait]
    impl AsrSource for FakeSource {
        async fn recv(&mut self) -> Result<Option<ProviderEvent>, SessionError> {
            // Quiet provider: never produces a response, never ends the
            // stream on its own.
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    struct FakeProvider {
        opens: Arc<AtomicU64>,
        sent: Arc<AtomicU64>,
        fail_sends: Arc<AtomicBool>,
    }

    #[async_trait]
    impl AsrProvider for FakeProvider {
        async fn open_stream(
            &self,
            _config: StreamConfig,
        ) -> Result<(Box<dyn AsrSink>, Box<dyn AsrSource>), SessionError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok((
                Box::new(FakeSink {
                    sent: self.sent.clone(),
                    fail_sends: self.fail_sends.clone(),
                }),
                Box::new(FakeSource),
            ))
        }
    }

    fn fake_provider() -> (Arc<FakeProvider>, Arc<AtomicU64>, Arc<AtomicBool>) {
        let opens = Arc::new(AtomicU64::new(0));
        let sent = Arc::new(AtomicU64::new(0));
        let fail_sends = Arc::new(AtomicBool::new(false));
        (
            Arc::new(FakeProvider {
                opens: opens.clone(),
                sent,
                fail_sends: fail_sends.clone(),
            }),
            opens,
            fail_sends,
        )
    }

    fn test_config() -> StreamConfig {
        StreamConfig {
            language_code: "ja-JP".into(),
            model: "latest_long".into(),
            enable_interim_results: true,
        }
    }

    fn frame() -> AudioFrame {
        AudioFrame::new(Bytes::from_static(&[1u8; 3200]), 0)
    }

    #[tokio::test(start_paused = true)]
    async fn renews_at_soft_limit_with_continuous_audio() {
        let (provider, opens, _) = fake_provider();
        let driver = AsrStreamDriver::new(provider, test_config());

        let (sender, queue) = audio_queue(CancellationToken::new());
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(driver.run(queue, events_tx));

        let feeder = tokio::spawn(async move {
            loop {
                if sender.send(frame()).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });

        tokio::time::sleep(EPOCH_SOFT_LIMIT + Duration::from_secs(2)).await;
        feeder.abort();
        // Feeder aborted with its sender: the queue drains and ends.

        let (exit, stats) = handle.await.unwrap();
        assert!(matches!(exit, DriverExit::Stopped));
        assert_eq!(stats.renewal_count, 1);
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert!(stats.chunks_sent >= 2700, "continuous audio was forwarded");
    }

    #[tokio::test(start_paused = true)]
    async fn silence_past_limit_yields_idle_timeout() {
        let (provider, _, _) = fake_provider();
        let driver = AsrStreamDriver::new(provider, test_config());

        let (_sender, queue) = audio_queue(CancellationToken::new());
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(driver.run(queue, events_tx));

        tokio::time::sleep(SILENCE_LIMIT + Duration::from_secs(2)).await;

        let (exit, stats) = handle.await.unwrap();
        assert!(matches!(exit, DriverExit::IdleTimeout));
        assert!(stats.idle_at_exit > SILENCE_LIMIT);
    }

    #[tokio::test(start_paused = true)]
    async fn first_commit_is_announced_once() {
        let (provider, _, _) = fake_provider();
        let driver = AsrStreamDriver::new(provider, test_config());

        let (sender, queue) = audio_queue(CancellationToken::new());
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(driver.run(queue, events_tx));

        sender.send(frame()).await.unwrap();
        sender.send(frame()).await.unwrap();
        drop(sender);

        let (exit, stats) = handle.await.unwrap();
        assert!(matches!(exit, DriverExit::Stopped));
        assert_eq!(stats.chunks_sent, 2);
        assert_eq!(stats.bytes_sent, 6400);

        let mut commits = 0;
        while let Ok(event) = events_rx.try_recv() {
            if matches!(event.outcome, EpochOutcome::Committed) {
                commits += 1;
            }
        }
        assert_eq!(commits, 1);
    }

    /// Provider whose first stream opens normally and whose replacement
    /// streams never finish connecting.
    struct StalledRenewalProvider {
        opens: Arc<AtomicU64>,
        sent: Arc<AtomicU64>,
        fail_sends: Arc<AtomicBool>,
    }

    #[async_trait]
    impl AsrProvider for StalledRenewalProvider {
        async fn open_stream(
            &self,
            _config: StreamConfig,
        ) -> Result<(Box<dyn AsrSink>, Box<dyn AsrSource>), SessionError> {
            if self.opens.fetch_add(1, Ordering::SeqCst) > 0 {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Ok((
                Box::new(FakeSink {
                    sent: self.sent.clone(),
                    fail_sends: self.fail_sends.clone(),
                }),
                Box::new(FakeSource),
            ))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_stalled_past_the_hard_limit_fails_the_session() {
        let provider = Arc::new(StalledRenewalProvider {
            opens: Arc::new(AtomicU64::new(0)),
            sent: Arc::new(AtomicU64::new(0)),
            fail_sends: Arc::new(AtomicBool::new(false)),
        });
        let driver = AsrStreamDriver::new(provider, test_config());

        let (sender, queue) = audio_queue(CancellationToken::new());
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(driver.run(queue, events_tx));

        let feeder = tokio::spawn(async move {
            loop {
                if sender.send(frame()).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });

        // Renewal starts at the soft limit and hangs; the session must fail
        // by the hard limit rather than keep writing to a doomed stream.
        tokio::time::sleep(crate::protocol_constants::EPOCH_HARD_LIMIT + Duration::from_secs(2))
            .await;

        let (exit, stats) = handle.await.unwrap();
        assert!(matches!(
            exit,
            DriverExit::Failed(SessionError::ProviderUnavailable(_))
        ));
        assert_eq!(stats.renewal_count, 0);
        feeder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_triggers_one_renewal_then_fails() {
        let (provider, opens, fail_sends) = fake_provider();
        let driver = AsrStreamDriver::new(provider, test_config());

        let (sender, queue) = audio_queue(CancellationToken::new());
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(driver.run(queue, events_tx));

        sender.send(frame()).await.unwrap();
        tokio::task::yield_now().await;

        // Every send now fails: the first failure renews, the retry on the
        // fresh epoch fails too, which is terminal.
        fail_sends.store(true, Ordering::SeqCst);
        sender.send(frame()).await.unwrap();

        let (exit, stats) = handle.await.unwrap();
        assert!(matches!(
            exit,
            DriverExit::Failed(SessionError::ProviderUnavailable(_))
        ));
        assert_eq!(stats.renewal_count, 1);
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }
}
