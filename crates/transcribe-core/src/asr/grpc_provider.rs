//! Production [`AsrProvider`] backed by a real gRPC bidirectional stream.

pub mod proto {
    tonic::include_proto!("transcribe.asr.v1");
}

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::Channel;
use tonic::Request;

use crate::error::SessionError;

use super::provider::{AsrProvider, AsrSink, AsrSource, ProviderEvent, StreamConfig, WordTiming};
use proto::speech_stream_client::SpeechStreamClient;
use proto::streaming_recognize_request::StreamingRequest;
use proto::{StreamingRecognitionConfig, StreamingRecognizeRequest};

const SAMPLE_RATE_HZ: u32 = crate::protocol_constants::SAMPLE_RATE_HZ;

/// Outbound request buffer depth; small because the driver pushes one frame
/// at a time and backpressure already lives in the audio queue.
const REQUEST_CHANNEL_DEPTH: usize = 8;

pub struct GrpcAsrProvider {
    client: SpeechStreamClient<Channel>,
    project_id: String,
    /// `authorization` header attached to every stream request.
    bearer: Option<MetadataValue<Ascii>>,
}

impl GrpcAsrProvider {
    pub async fn connect(
        endpoint: String,
        project_id: String,
        access_token: Option<String>,
    ) -> Result<Self, SessionError> {
        let bearer = access_token
            .map(|token| {
                format!("Bearer {token}")
                    .parse::<MetadataValue<Ascii>>()
                    .map_err(|_| {
                        SessionError::ProviderAuth(
                            "provider credentials are not a valid header value".into(),
                        )
                    })
            })
            .transpose()?;

        let channel = Channel::from_shared(endpoint)
            .map_err(|e| SessionError::Internal(format!("invalid provider endpoint: {e}")))?
            .connect()
            .await
            .map_err(|e| SessionError::ProviderUnavailable(e.to_string()))?;

        Ok(Self {
            client: SpeechStreamClient::new(channel),
            project_id,
            bearer,
        })
    }
}

#[async_trait]
impl AsrProvider for GrpcAsrProvider {
    async fn open_stream(
        &self,
        config: StreamConfig,
    ) -> Result<(Box<dyn AsrSink>, Box<dyn AsrSource>), SessionError> {
        let (tx, rx) = mpsc::channel::<StreamingRecognizeRequest>(REQUEST_CHANNEL_DEPTH);

        let config_request = StreamingRecognizeRequest {
            streaming_request: Some(StreamingRequest::Config(StreamingRecognitionConfig {
                project_id: self.project_id.clone(),
                language_code: config.language_code,
                model: config.model,
                enable_interim_results: config.enable_interim_results,
                sample_rate_hertz: SAMPLE_RATE_HZ,
            })),
        };
        tx.send(config_request).await.map_err(|_| {
            SessionError::Internal("provider request channel closed before handshake".into())
        })?;

        let mut request = Request::new(ReceiverStream::new(rx));
        if let Some(bearer) = &self.bearer {
            request.metadata_mut().insert("authorization", bearer.clone());
        }

        let mut client = self.client.clone();
        let response = client
            .streaming_recognize(request)
            .await
            .map_err(|status| map_status(&status))?;

        Ok((
            Box::new(GrpcAsrSink { tx: Some(tx) }),
            Box::new(GrpcAsrSource {
                inbound: response.into_inner(),
                pending: VecDeque::new(),
            }),
        ))
    }
}

struct GrpcAsrSink {
    tx: Option<mpsc::Sender<StreamingRecognizeRequest>>,
}

#[async_trait]
impl AsrSink for GrpcAsrSink {
    async fn send_audio(&mut self, frame: &[u8]) -> Result<(), SessionError> {
        let Some(tx) = &self.tx else {
            return Err(SessionError::Internal(
                "send_audio called on a closed provider sink".into(),
            ));
        };
        let request = StreamingRecognizeRequest {
            streaming_request: Some(StreamingRequest::AudioContent(frame.to_vec())),
        };
        tx.send(request)
            .await
            .map_err(|_| SessionError::ProviderUnavailable("provider write side closed".into()))
    }

    async fn close(&mut self) {
        // Dropping the sender half closes the request stream from our side;
        // the provider responds with the remaining buffered results then EOF.
        self.tx.take();
    }
}

struct GrpcAsrSource {
    inbound: tonic::Streaming<proto::StreamingRecognizeResponse>,
    /// One response can pack several results (a stabilized final plus the
    /// next interim); they are buffered and handed out one per `recv` so
    /// none is dropped.
    pending: VecDeque<ProviderEvent>,
}

#[async_trait]
impl AsrSource for GrpcAsrSource {
    async fn recv(&mut self) -> Result<Option<ProviderEvent>, SessionError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            match self.inbound.message().await {
                Ok(Some(response)) => {
                    self.pending
                        .extend(response.results.into_iter().map(to_provider_event));
                }
                Ok(None) => return Ok(None),
                Err(status) => return Err(map_status(&status)),
            }
        }
    }
}

fn to_provider_event(result: proto::StreamingRecognitionResult) -> ProviderEvent {
    ProviderEvent {
        result_id: (!result.result_id.is_empty()).then_some(result.result_id),
        text: result.transcript,
        is_final: result.is_final,
        confidence: result.confidence,
        words: result
            .words
            .into_iter()
            .map(|w| WordTiming {
                word: w.word,
                start_secs: w.start_time,
                end_secs: w.end_time,
            })
            .collect(),
    }
}

fn map_status(status: &tonic::Status) -> SessionError {
    use tonic::Code;
    match status.code() {
        Code::Unauthenticated | Code::PermissionDenied => {
            SessionError::ProviderAuth(status.message().to_string())
        }
        Code::Unavailable | Code::DeadlineExceeded | Code::ResourceExhausted => {
            SessionError::ProviderUnavailable(status.message().to_string())
        }
        _ => SessionError::Internal(format!("provider error: {status}")),
    }
}
