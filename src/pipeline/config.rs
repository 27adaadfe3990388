//! Pipeline configuration

use std::time::Duration;

use serde::Deserialize;

/// Capture/annotate pipeline configuration options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Delay before the first reconnect attempt
    #[serde(with = "millis")]
    pub reconnect_backoff: Duration,

    /// Upper bound for the exponential reconnect delay
    #[serde(with = "millis")]
    pub max_reconnect_backoff: Duration,

    /// Consecutive source failures tolerated before the channel is disabled
    pub max_consecutive_failures: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff: Duration::from_millis(500),
            max_reconnect_backoff: Duration::from_secs(10),
            max_consecutive_failures: 10,
        }
    }
}

impl PipelineConfig {
    /// Set the initial reconnect delay
    pub fn reconnect_backoff(mut self, delay: Duration) -> Self {
        self.reconnect_backoff = delay;
        self
    }

    /// Set the maximum reconnect delay
    pub fn max_reconnect_backoff(mut self, delay: Duration) -> Self {
        self.max_reconnect_backoff = delay;
        self
    }

    /// Set the failure threshold
    pub fn max_consecutive_failures(mut self, failures: u32) -> Self {
        self.max_consecutive_failures = failures;
        self
    }

    /// Delay before reconnect attempt number `failures` (1-based).
    ///
    /// Doubles per failure and is capped at `max_reconnect_backoff`.
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        self.reconnect_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_reconnect_backoff)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();

        assert_eq!(config.reconnect_backoff, Duration::from_millis(500));
        assert_eq!(config.max_reconnect_backoff, Duration::from_secs(10));
        assert_eq!(config.max_consecutive_failures, 10);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = PipelineConfig::default()
            .reconnect_backoff(Duration::from_millis(100))
            .max_reconnect_backoff(Duration::from_millis(1000));

        assert_eq!(config.backoff_for(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(400));
        assert_eq!(config.backoff_for(4), Duration::from_millis(800));
        assert_eq!(config.backoff_for(5), Duration::from_millis(1000));
        assert_eq!(config.backoff_for(100), Duration::from_millis(1000));
    }

    #[test]
    fn test_deserialize_millis() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "reconnect_backoff": 250, "max_consecutive_failures": 3 }"#)
                .unwrap();

        assert_eq!(config.reconnect_backoff, Duration::from_millis(250));
        assert_eq!(config.max_consecutive_failures, 3);
        assert_eq!(config.max_reconnect_backoff, Duration::from_secs(10));
    }
}
