//! Retry settings for job execution.

use serde::{Deserialize, Serialize};

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `initial_delay * n` before the attempt after the n-th failure.
    #[default]
    Linear,
    /// `initial_delay * 2^(n-1)`.
    Exponential,
}

/// Retry configuration for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Total attempts, not retries (1 = run once, never retry).
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default)]
    pub backoff: Backoff,
    /// Delay before the second attempt, as a duration string.
    #[serde(default = "default_initial_delay")]
    pub initial_delay: String,
}

fn default_attempts() -> u32 {
    1
}

fn default_initial_delay() -> String {
    "1s".to_string()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff: Backoff::default(),
            initial_delay: default_initial_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mean_no_retry() {
        let config = RetryConfig::default();
        assert_eq!(config.attempts, 1);
        assert_eq!(config.backoff, Backoff::Linear);
        assert_eq!(config.initial_delay, "1s");
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: RetryConfig = serde_json::from_str(r#"{"attempts": 3}"#).unwrap();
        assert_eq!(config.attempts, 3);
        assert_eq!(config.backoff, Backoff::Linear);
        assert_eq!(config.initial_delay, "1s");

        let config: RetryConfig =
            serde_json::from_str(r#"{"attempts": 5, "backoff": "exponential", "initialDelay": "250ms"}"#)
                .unwrap();
        assert_eq!(config.backoff, Backoff::Exponential);
        assert_eq!(config.initial_delay, "250ms");
    }
}
