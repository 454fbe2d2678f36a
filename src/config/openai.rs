//! Assistants API configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Configuration for the hosted Assistants API.
///
/// The API key and assistant id are required; their absence fails
/// [`validate`](OpenAiConfig::validate) so the process never starts without
/// them. Polling values feed the bounded run-completion loop.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    /// API key for authentication
    pub api_key: Option<String>,

    /// Assistant id the proxy runs threads against (must look like "asst_...")
    pub assistant_id: Option<String>,

    /// Base URL for the API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Initial run-poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Upper bound for the backed-off poll interval in milliseconds
    #[serde(default = "default_max_poll_interval")]
    pub max_poll_interval_ms: u64,

    /// Overall deadline for a run to reach a terminal state, in seconds
    #[serde(default = "default_run_deadline")]
    pub run_deadline_secs: u64,
}

impl OpenAiConfig {
    /// Get the per-request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get the initial poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get the poll interval cap as a Duration
    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms)
    }

    /// Get the run deadline as a Duration
    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }

    /// Check if an API key is configured
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|k| !k.is_empty())
    }

    /// Check if an assistant id is configured
    pub fn has_assistant_id(&self) -> bool {
        self.assistant_id.as_ref().is_some_and(|a| !a.is_empty())
    }

    /// Validate Assistants API configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.has_api_key() {
            return Err(ValidationError::MissingRequired("SKYSHOW__OPENAI__API_KEY"));
        }
        if !self.has_assistant_id() {
            return Err(ValidationError::MissingRequired(
                "SKYSHOW__OPENAI__ASSISTANT_ID",
            ));
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms > self.max_poll_interval_ms {
            return Err(ValidationError::InvalidPollInterval);
        }
        if self.run_deadline_secs == 0 {
            return Err(ValidationError::InvalidRunDeadline);
        }
        Ok(())
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            assistant_id: None,
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            poll_interval_ms: default_poll_interval(),
            max_poll_interval_ms: default_max_poll_interval(),
            run_deadline_secs: default_run_deadline(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    800
}

fn default_max_poll_interval() -> u64 {
    5_000
}

fn default_run_deadline() -> u64 {
    120
}
