//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to services.
//! It provides the router construction and server startup functionality.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::asr::AsrProvider;
use crate::session::SessionRegistry;
use crate::sink::Sink;
use crate::slide::SlideMatcher;
use crate::state::Config;

pub mod http;
pub mod ws;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("no available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
/// All business logic lives in the services themselves.
#[derive(Clone)]
pub struct AppState {
    /// Opens provider streams for new sessions.
    pub asr_provider: Arc<dyn AsrProvider>,
    /// Publishes finals to the backend.
    pub sink: Arc<dyn Sink>,
    /// Default slide matcher for sessions with no presentation loaded.
    pub slide_matcher: Arc<dyn SlideMatcher>,
    /// Tracks active sessions and enforces `SESSION_MAX`.
    pub session_registry: Arc<SessionRegistry>,
    /// Root cancellation token; every session's token is a child of this.
    pub cancel_token: CancellationToken,
    /// Application configuration.
    pub config: Arc<Config>,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    asr_provider: Option<Arc<dyn AsrProvider>>,
    sink: Option<Arc<dyn Sink>>,
    slide_matcher: Option<Arc<dyn SlideMatcher>>,
    session_registry: Option<Arc<SessionRegistry>>,
    cancel_token: Option<CancellationToken>,
    config: Option<Arc<Config>>,
}

impl AppStateBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates all shared service fields from a `BootstrappedServices`
    /// container, leaving only `config` to be set individually.
    pub fn from_services(mut self, services: &crate::BootstrappedServices) -> Self {
        self.asr_provider = Some(Arc::clone(&services.asr_provider));
        self.sink = Some(Arc::clone(&services.sink));
        self.slide_matcher = Some(Arc::clone(&services.slide_matcher));
        self.session_registry = Some(Arc::clone(&services.session_registry));
        self.cancel_token = Some(services.cancel_token.clone());
        self
    }

    pub fn asr_provider(mut self, provider: Arc<dyn AsrProvider>) -> Self {
        self.asr_provider = Some(provider);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn slide_matcher(mut self, matcher: Arc<dyn SlideMatcher>) -> Self {
        self.slide_matcher = Some(matcher);
        self
    }

    pub fn session_registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.session_registry = Some(registry);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn config(mut self, config: Arc<Config>) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the `AppState`, panicking if required fields are missing.
    pub fn build(self) -> AppState {
        AppState {
            asr_provider: self.asr_provider.expect("asr_provider is required"),
            sink: self.sink.expect("sink is required"),
            slide_matcher: self.slide_matcher.expect("slide_matcher is required"),
            session_registry: self.session_registry.expect("session_registry is required"),
            cancel_token: self.cancel_token.expect("cancel_token is required"),
            config: self.config.expect("config is required"),
        }
    }
}

impl AppState {
    /// Creates a new builder for constructing an `AppState`.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Starts the HTTP server on the configured or auto-discovered port.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let preferred_port = state.config.preferred_port;
    let (port, listener) = if preferred_port > 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], preferred_port));
        (preferred_port, tokio::net::TcpListener::bind(&addr).await?)
    } else {
        find_available_port(49400, 49410).await?
    };

    tracing::info!(port, "server listening on http://0.0.0.0:{port}");
    let app = http::create_router(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}
