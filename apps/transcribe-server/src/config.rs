//! Command-line arguments and the optional YAML config file.
//!
//! Secrets (provider credentials, backend token) come only from the
//! environment, loaded fail-fast by `transcribe_core::Config::from_env`.
//! The YAML file covers the non-secret deployment knobs, and an environment
//! variable always wins over a file value so a container override never
//! needs to edit the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use transcribe_core::Config;

/// Headless server for live lecture transcription sessions.
#[derive(Parser, Debug)]
#[command(name = "transcribe-server")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log filter directives (e.g. "info", "transcribe_core=debug").
    #[arg(short, long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Optional YAML config file for non-secret settings.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bind port (overrides both `PORT` and the config file).
    #[arg(short = 'p', long, env = "SERVER_PORT")]
    pub port: Option<u16>,

    /// Path to the ASR provider credentials file (overrides
    /// `PROVIDER_CREDENTIALS_PATH` from the environment).
    #[arg(short = 'c', long)]
    pub credentials: Option<PathBuf>,
}

/// Non-secret settings loadable from the YAML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Port to bind the HTTP server to. Override: `PORT`.
    pub port: Option<u16>,
    /// Maximum concurrent sessions. Override: `SESSION_MAX`.
    pub session_max: Option<usize>,
    /// Sink callback timeout in seconds. Override: `BACKEND_CALLBACK_TIMEOUT`.
    pub backend_callback_timeout: Option<u64>,
}

impl FileConfig {
    /// Loads the YAML file, or an empty config when no path was given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Fills in fields the environment left unset. Environment variables
    /// always take precedence over file values.
    pub fn apply_to(&self, config: &mut Config) {
        if std::env::var_os("PORT").is_none() {
            if let Some(port) = self.port {
                config.preferred_port = port;
            }
        }
        if std::env::var_os("SESSION_MAX").is_none() {
            if let Some(session_max) = self.session_max {
                config.session_max = session_max;
            }
        }
        if std::env::var_os("BACKEND_CALLBACK_TIMEOUT").is_none() {
            if let Some(secs) = self.backend_callback_timeout {
                config.backend_callback_timeout_secs = secs;
            }
        }
    }
}
