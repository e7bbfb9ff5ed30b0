//! Timer-driven session behavior under `tokio::time::pause`: epoch renewal
//! at the soft limit and the silence timeout. These drive a [`SessionHandle`]
//! directly so the 270 s / 60 s clocks can be advanced deterministically.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use transcribe_core::asr::{AsrProvider, AsrSink, AsrSource, ProviderEvent, StreamConfig};
use transcribe_core::{
    DriverExit, NoSlideMatcher, NullSink, SessionError, SessionEvent, SessionEventBridge,
    SessionHandle, StartRequest,
};

/// Provider that accepts audio and never responds; its response stream only
/// ends when the test tears the session down.
struct QuietProvider;

#[async_trait]
impl AsrProvider for QuietProvider {
    async fn open_stream(
        &self,
        _config: StreamConfig,
    ) -> Result<(Box<dyn AsrSink>, Box<dyn AsrSource>), SessionError> {
        Ok((Box::new(QuietSink), Box::new(QuietSource)))
    }
}

struct QuietSink;

#[async_trait]
impl AsrSink for QuietSink {
    async fn send_audio(&mut self, _frame: &[u8]) -> Result<(), SessionError> {
        Ok(())
    }
    async fn close(&mut self) {}
}

struct QuietSource;

#[async_trait]
impl AsrSource for QuietSource {
    async fn recv(&mut self) -> Result<Option<ProviderEvent>, SessionError> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

fn start_request() -> StartRequest {
    StartRequest {
        session_id: "timer-test".into(),
        presentation_id: "timer-test".into(),
        lecture_id: 42,
        language_code: "ja-JP".into(),
        model: "latest_long".into(),
        enable_interim_results: true,
    }
}

#[tokio::test(start_paused = true)]
async fn continuous_audio_past_the_soft_limit_renews_exactly_once() {
    let (bridge, mut events_rx) = SessionEventBridge::new();
    let (exit_tx, mut exit_rx) = mpsc::channel(1);
    let mut session = SessionHandle::idle(CancellationToken::new(), Arc::new(bridge), exit_tx);

    session
        .start(
            start_request(),
            Arc::new(QuietProvider),
            Arc::new(NullSink),
            Arc::new(NoSlideMatcher),
        )
        .await
        .unwrap();

    // 280 s of continuous 100 ms frames: one renewal at 270 s, no second.
    for _ in 0..2800 {
        session
            .push_audio(Bytes::from(vec![1u8; 3200]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    session.begin_stop().await.unwrap();

    let (exit, stats) = timeout(Duration::from_secs(60), exit_rx.recv())
        .await
        .expect("driver exit overdue")
        .expect("driver exit channel closed");
    assert!(matches!(exit, DriverExit::Stopped));
    assert_eq!(stats.renewal_count, 1);
    assert_eq!(stats.chunks_sent, 2800);

    let close_code = session.finalize(&exit, stats);
    assert_eq!(close_code, 1000);

    let mut saw_closed = false;
    let mut errors = 0;
    while let Ok(event) = events_rx.try_recv() {
        match event {
            SessionEvent::Error { .. } => errors += 1,
            SessionEvent::SessionClosed { summary, .. } => {
                assert_eq!(summary.renewal_count, 1);
                assert_eq!(summary.status, "completed");
                saw_closed = true;
            }
            _ => {}
        }
    }
    assert!(saw_closed, "session_closed was emitted");
    assert_eq!(errors, 0, "renewal is silent to the client");
}

#[tokio::test(start_paused = true)]
async fn silence_past_the_limit_closes_with_idle_timeout() {
    let (bridge, mut events_rx) = SessionEventBridge::new();
    let (exit_tx, mut exit_rx) = mpsc::channel(1);
    let mut session = SessionHandle::idle(CancellationToken::new(), Arc::new(bridge), exit_tx);

    session
        .start(
            start_request(),
            Arc::new(QuietProvider),
            Arc::new(NullSink),
            Arc::new(NoSlideMatcher),
        )
        .await
        .unwrap();

    // 200 ms of audio, then nothing.
    session
        .push_audio(Bytes::from(vec![1u8; 6400]))
        .await
        .unwrap();

    let (exit, stats) = timeout(Duration::from_secs(120), exit_rx.recv())
        .await
        .expect("driver exit overdue")
        .expect("driver exit channel closed");
    assert!(matches!(exit, DriverExit::IdleTimeout));
    assert!(stats.idle_at_exit >= Duration::from_secs(60));

    let close_code = session.finalize(&exit, stats);
    assert_eq!(close_code, 1000);

    let mut statuses = Vec::new();
    let mut errors = 0;
    while let Ok(event) = events_rx.try_recv() {
        match event {
            SessionEvent::Error { .. } => errors += 1,
            SessionEvent::SessionClosed { summary, .. } => statuses.push(summary.status),
            _ => {}
        }
    }
    assert_eq!(statuses, vec!["kIdleTimeout".to_string()]);
    assert_eq!(errors, 0, "idle timeout is a graceful close, not an error");
}
