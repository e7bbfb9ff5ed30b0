//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. This pattern provides:
//!
//! - **Clarity**: All dependency relationships are visible in one place
//! - **Testability**: Easy to swap implementations for testing
//! - **Maintainability**: Service creation logic is isolated from usage

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::asr::{AsrProvider, GrpcAsrProvider};
use crate::error::{SessionError, SessionResult};
use crate::session::SessionRegistry;
use crate::sink::{HttpSink, NullSink, Sink};
use crate::slide::{NoSlideMatcher, SlideMatcher};
use crate::state::Config;

/// Container for all bootstrapped services. Cloned into every session's
/// [`crate::api::AppState`] handler invocation.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Opens new ASR provider streams; shared across all sessions.
    pub asr_provider: Arc<dyn AsrProvider>,
    /// Publishes finals to the backend, or drops them if unconfigured.
    pub sink: Arc<dyn Sink>,
    /// Default slide matcher used when a session has no presentation loaded.
    pub slide_matcher: Arc<dyn SlideMatcher>,
    /// Tracks active sessions and enforces `SESSION_MAX`.
    pub session_registry: Arc<SessionRegistry>,
    /// Cancellation token for graceful shutdown; every session's token is a
    /// child of this one.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Cancels every in-flight session. Callers await the sessions'
    /// individual drain logic separately; this only raises the signal.
    pub fn shutdown(&self) {
        tracing::info!("beginning shutdown, cancelling all sessions");
        self.cancel_token.cancel();
    }
}

/// Bootstraps all application services with their dependencies. Wiring
/// order: ASR provider connection, Sink, slide matcher, session registry.
///
/// # Errors
///
/// Returns an error if the provider credentials cannot be read or the
/// provider connection fails.
pub async fn bootstrap_services(config: &Config) -> SessionResult<BootstrappedServices> {
    let access_token = std::fs::read_to_string(&config.provider_credentials_path)
        .map_err(|e| {
            SessionError::ProviderAuth(format!(
                "failed to read provider credentials at {}: {e}",
                config.provider_credentials_path
            ))
        })?
        .trim()
        .to_string();

    let provider = GrpcAsrProvider::connect(
        provider_endpoint(),
        config.provider_project_id.clone(),
        Some(access_token),
    )
    .await?;
    let asr_provider: Arc<dyn AsrProvider> = Arc::new(provider);

    let sink: Arc<dyn Sink> = match &config.backend_base_url {
        Some(base_url) => Arc::new(HttpSink::new(
            base_url.clone(),
            config.backend_service_token.clone(),
            Duration::from_secs(config.backend_callback_timeout_secs),
        )),
        None => Arc::new(NullSink),
    };

    let slide_matcher: Arc<dyn SlideMatcher> = Arc::new(NoSlideMatcher);
    let session_registry = Arc::new(SessionRegistry::new(config.session_max));
    let cancel_token = CancellationToken::new();

    Ok(BootstrappedServices {
        asr_provider,
        sink,
        slide_matcher,
        session_registry,
        cancel_token,
    })
}

/// Endpoint of the ASR provider. Overridable for staging stacks or a local
/// fake; production deployments use the default.
fn provider_endpoint() -> String {
    std::env::var("PROVIDER_ENDPOINT")
        .unwrap_or_else(|_| "https://speech.asr-cloud.net:443".into())
}
