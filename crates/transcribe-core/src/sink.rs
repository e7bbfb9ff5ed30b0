//! Best-effort delivery of final transcription results to the backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::protocol_constants::{SINK_MAX_ATTEMPTS, SINK_TIMEOUT};

/// One final result, ready to publish to the backend.
#[derive(Debug, Clone, Serialize)]
pub struct SinkRecord {
    pub lecture_id: i64,
    pub session_id: String,
    pub presentation_id: String,
    pub text: String,
    pub confidence: f32,
    pub timestamp: u64,
    pub is_final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide_confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_keywords: Option<Vec<String>>,
}

/// Publishes final results somewhere outside the session's own WebSocket.
/// Failures here must never affect the session itself; implementations
/// handle their own retries and swallow the final error.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn publish(&self, record: SinkRecord);
}

/// Sink that does nothing, used when `BACKEND_BASE_URL` is not configured.
pub struct NullSink;

#[async_trait]
impl Sink for NullSink {
    async fn publish(&self, _record: SinkRecord) {}
}

/// Sink backed by a POST to the backend's `/api/transcriptions` endpoint.
/// Retries once on failure, then logs and drops.
pub struct HttpSink {
    client: Client,
    base_url: String,
    service_token: Option<String>,
}

impl HttpSink {
    pub fn new(base_url: String, service_token: Option<String>, timeout: std::time::Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url,
            service_token,
        }
    }

    async fn attempt(&self, record: &SinkRecord) -> Result<(), reqwest::Error> {
        let url = format!("{}/api/transcriptions", self.base_url.trim_end_matches('/'));
        let mut request = self.client.post(url).timeout(SINK_TIMEOUT).json(record);
        if let Some(token) = &self.service_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        response.error_for_status().map(|_| ())
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn publish(&self, record: SinkRecord) {
        for attempt in 1..=SINK_MAX_ATTEMPTS {
            match self.attempt(&record).await {
                Ok(()) => return,
                Err(err) if attempt < SINK_MAX_ATTEMPTS => {
                    tracing::warn!(error = %err, attempt, "sink publish failed, retrying");
                }
                Err(err) => {
                    tracing::warn!(error = %err, session_id = %record.session_id, "sink publish dropped");
                }
            }
        }
    }
}
