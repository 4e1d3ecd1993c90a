//! Server configuration
//!
//! All knobs come from environment variables with sensible defaults; the
//! bind address can additionally be overridden by the first positional
//! argument.

use std::env;
use std::time::Duration;

/// Default listen address
const DEFAULT_ADDR: &str = "127.0.0.1:8888";

/// Default base URL of the NLP inference service
const DEFAULT_NLP_BASE_URL: &str = "http://127.0.0.1:8000";

/// Default per-request timeout for collaborator calls, in seconds
const DEFAULT_NLP_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration for the chat hub
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the TCP listener binds to
    pub addr: String,
    /// Base URL of the NLP inference service
    pub nlp_base_url: String,
    /// Per-request timeout for collaborator calls
    pub nlp_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            nlp_base_url: DEFAULT_NLP_BASE_URL.to_string(),
            nlp_timeout: Duration::from_secs(DEFAULT_NLP_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Recognized variables: `CHATHUB_ADDR`, `NLP_BASE_URL`,
    /// `NLP_TIMEOUT_SECS`. Empty values fall back to the defaults.
    pub fn from_env() -> Self {
        let addr = env::var("CHATHUB_ADDR")
            .ok()
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());

        let nlp_base_url = env::var("NLP_BASE_URL")
            .ok()
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_NLP_BASE_URL.to_string());

        let nlp_timeout = env::var("NLP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_NLP_TIMEOUT_SECS));

        Self {
            addr,
            nlp_base_url,
            nlp_timeout,
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
