//! Transcribe Server - standalone headless server for live lecture transcription.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use transcribe_core::{bootstrap_services, start_server, AppState, Config};

use crate::config::{Args, FileConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&args.log_level))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "transcribe-server starting");

    // Environment first, then the optional YAML file for whatever the
    // environment left unset, then explicit CLI flags on top.
    let mut core_config = Config::from_env().context("failed to load configuration")?;
    let file_config =
        FileConfig::load(args.config.as_deref()).context("failed to load config file")?;
    file_config.apply_to(&mut core_config);

    if let Some(port) = args.port {
        core_config.preferred_port = port;
    }
    if let Some(credentials) = args.credentials {
        core_config.provider_credentials_path = credentials.display().to_string();
    }

    // Bootstrap services
    let services = bootstrap_services(&core_config)
        .await
        .context("failed to bootstrap services")?;

    tracing::info!("services bootstrapped successfully");

    // Build app state for the HTTP server
    let app_state = AppState::builder()
        .from_services(&services)
        .config(Arc::new(core_config))
        .build();

    // Spawn HTTP server on the main tokio runtime.
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            tracing::error!(error = %e, "server error");
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    tracing::info!("shutdown signal received, cleaning up");

    // Cancel every session, then give them a bounded grace period to drain
    // and leave the registry before the listener is torn down.
    services.shutdown();
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while services.session_registry.active_count() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    server_handle.abort();

    tracing::info!("shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
