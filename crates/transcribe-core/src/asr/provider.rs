//! Abstract ASR provider transport.
//!
//! The stream driver depends on this trait, not on a live network or a
//! specific cloud API, which is what lets the renewal/epoch machinery be
//! unit tested with scripted in-memory fakes.

use async_trait::async_trait;

use crate::error::SessionError;

/// First-frame handshake sent on every new epoch.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub language_code: String,
    pub model: String,
    pub enable_interim_results: bool,
}

#[derive(Debug, Clone)]
pub struct WordTiming {
    pub word: String,
    pub start_secs: f64,
    pub end_secs: f64,
}

/// One parsed ASR response, flattened to the shape the result handler
/// consumes.
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    /// Stable per-utterance id, when the provider supplies one. Used for the
    /// `(epoch_index, provider_result_id)` dedup key.
    pub result_id: Option<String>,
    pub text: String,
    pub is_final: bool,
    pub confidence: f32,
    pub words: Vec<WordTiming>,
}

/// Write half of one epoch's stream.
#[async_trait]
pub trait AsrSink: Send {
    async fn send_audio(&mut self, frame: &[u8]) -> Result<(), SessionError>;
    /// Half-closes the write side. The read half may still yield buffered
    /// results belonging to audio already sent.
    async fn close(&mut self);
}

/// Read half of one epoch's stream.
#[async_trait]
pub trait AsrSource: Send {
    /// Reads the next response, or `Ok(None)` on clean end-of-stream.
    async fn recv(&mut self) -> Result<Option<ProviderEvent>, SessionError>;
}

/// Factory for opening new provider streams. One instance is shared across
/// all sessions on the server.
#[async_trait]
pub trait AsrProvider: Send + Sync {
    async fn open_stream(
        &self,
        config: StreamConfig,
    ) -> Result<(Box<dyn AsrSink>, Box<dyn AsrSource>), SessionError>;
}
