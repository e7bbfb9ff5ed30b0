//! Application configuration, loaded fail-fast from the environment.

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{DEFAULT_BACKEND_CALLBACK_TIMEOUT_SECS, DEFAULT_SESSION_MAX};

/// Error loading [`Config`] from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Server-wide configuration, loaded from the environment at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Preferred HTTP/WS listen port (0 = auto-allocate).
    pub preferred_port: u16,

    /// Path to the ASR provider's credentials file.
    pub provider_credentials_path: String,
    /// ASR provider project/tenant identifier.
    pub provider_project_id: String,

    /// Backend base URL for the Sink callback. `None` disables the Sink.
    pub backend_base_url: Option<String>,
    /// Bearer token for the Sink callback.
    pub backend_service_token: Option<String>,
    /// Sink HTTP callback timeout.
    pub backend_callback_timeout_secs: u64,

    /// Maximum concurrent sessions before new connections are refused
    /// with close code 1013.
    pub session_max: usize,
}

impl Config {
    /// Loads configuration from environment variables, failing fast if a
    /// required variable is missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider_credentials_path = required_env("PROVIDER_CREDENTIALS_PATH")?;
        let provider_project_id = required_env("PROVIDER_PROJECT_ID")?;

        let backend_base_url = std::env::var("BACKEND_BASE_URL").ok();
        let backend_service_token = std::env::var("BACKEND_SERVICE_TOKEN").ok();

        let backend_callback_timeout_secs = match std::env::var("BACKEND_CALLBACK_TIMEOUT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("BACKEND_CALLBACK_TIMEOUT", raw))?,
            Err(_) => DEFAULT_BACKEND_CALLBACK_TIMEOUT_SECS,
        };

        let session_max = match std::env::var("SESSION_MAX") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("SESSION_MAX", raw))?,
            Err(_) => DEFAULT_SESSION_MAX,
        };

        let preferred_port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("PORT", raw))?,
            Err(_) => 0,
        };

        Ok(Self {
            preferred_port,
            provider_credentials_path,
            provider_project_id,
            backend_base_url,
            backend_service_token,
            backend_callback_timeout_secs,
            session_max,
        })
    }
}

fn required_env(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_clean_env<F: FnOnce()>(f: F) {
        let _guard = ENV_LOCK.lock().unwrap();
        for var in [
            "PROVIDER_CREDENTIALS_PATH",
            "PROVIDER_PROJECT_ID",
            "BACKEND_BASE_URL",
            "BACKEND_SERVICE_TOKEN",
            "BACKEND_CALLBACK_TIMEOUT",
            "SESSION_MAX",
            "PORT",
        ] {
            std::env::remove_var(var);
        }
        f();
    }

    #[test]
    fn missing_required_vars_fails_fast() {
        with_clean_env(|| {
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::Missing("PROVIDER_CREDENTIALS_PATH")));
        });
    }

    #[test]
    fn loads_with_defaults_when_optional_vars_are_unset() {
        with_clean_env(|| {
            std::env::set_var("PROVIDER_CREDENTIALS_PATH", "/etc/provider/creds.json");
            std::env::set_var("PROVIDER_PROJECT_ID", "proj-1");

            let config = Config::from_env().unwrap();
            assert_eq!(config.session_max, DEFAULT_SESSION_MAX);
            assert_eq!(
                config.backend_callback_timeout_secs,
                DEFAULT_BACKEND_CALLBACK_TIMEOUT_SECS
            );
            assert!(config.backend_base_url.is_none());

            std::env::remove_var("PROVIDER_CREDENTIALS_PATH");
            std::env::remove_var("PROVIDER_PROJECT_ID");
        });
    }

    #[test]
    fn invalid_session_max_is_rejected() {
        with_clean_env(|| {
            std::env::set_var("PROVIDER_CREDENTIALS_PATH", "/etc/provider/creds.json");
            std::env::set_var("PROVIDER_PROJECT_ID", "proj-1");
            std::env::set_var("SESSION_MAX", "not-a-number");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::Invalid("SESSION_MAX", _)));

            std::env::remove_var("PROVIDER_CREDENTIALS_PATH");
            std::env::remove_var("PROVIDER_PROJECT_ID");
            std::env::remove_var("SESSION_MAX");
        });
    }
}
