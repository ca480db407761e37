//! Configuration data structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure containing all settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Global application settings.
    #[serde(default)]
    pub global: GlobalConfig,

    /// Submission queue tuning.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Diagnostic event log settings.
    #[serde(default)]
    pub event_log: EventLogConfig,

    /// Submission backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Lag and failure injection for testing the pipeline.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// Global application settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus: PrometheusConfig::default(),
        }
    }
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrometheusConfig {
    /// Whether to enable the Prometheus metrics endpoint.
    #[serde(default)]
    pub enabled: bool,

    /// Port for the Prometheus metrics HTTP server.
    #[serde(default = "default_prometheus_port")]
    pub port: u16,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_prometheus_port(),
        }
    }
}

/// Submission queue configuration.
///
/// Copied into the queue at construction; change it at runtime only through
/// [`crate::queue::SubmissionQueue::reconfigure`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    /// Retries allowed after the first attempt (3 = up to 4 attempts).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between processing cycles, in milliseconds.
    #[serde(default = "default_inter_item_delay_ms")]
    pub inter_item_delay_ms: u64,

    /// Pause before re-attempting a failed entry when `retry_delay_mode` is `distinct`.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Which delay applies before a retry.
    #[serde(default)]
    pub retry_delay_mode: RetryDelayMode,

    /// Maximum number of entries waiting in the queue.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Upper bound on a single submit call; `None` waits indefinitely.
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: Option<u64>,
}

impl QueueConfig {
    /// Delay between cycles after a success or a permanent failure.
    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }

    /// Delay before the next cycle after a retryable failure.
    pub fn retry_delay(&self) -> Duration {
        match self.retry_delay_mode {
            RetryDelayMode::Distinct => Duration::from_millis(self.retry_delay_ms),
            RetryDelayMode::InterItem => self.inter_item_delay(),
        }
    }

    /// Timeout applied to each submit call.
    pub fn submit_timeout(&self) -> Option<Duration> {
        self.submit_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            inter_item_delay_ms: default_inter_item_delay_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_delay_mode: RetryDelayMode::default(),
            max_queue_size: default_max_queue_size(),
            submit_timeout_ms: default_submit_timeout_ms(),
        }
    }
}

/// Delay applied before re-attempting a failed entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryDelayMode {
    /// Wait `retry_delay_ms` before retrying.
    #[default]
    Distinct,
    /// Reuse the short inter-item delay for retries too.
    InterItem,
}

/// Diagnostic event log configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventLogConfig {
    /// Whether queue lifecycle events are recorded.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Number of events kept; the oldest are discarded first.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_size: default_history_size(),
        }
    }
}

/// Submission backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// URL that receives one POST per submitted answer.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Lag and failure injection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticsConfig {
    /// Extra latency added before every submit call, in milliseconds.
    #[serde(default)]
    pub simulated_lag_ms: u64,

    /// Fail every Nth submit call (0 disables).
    #[serde(default)]
    pub fail_every: u32,
}

impl DiagnosticsConfig {
    /// Returns true if any injection is configured.
    pub fn is_active(&self) -> bool {
        self.simulated_lag_ms > 0 || self.fail_every > 0
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_prometheus_port() -> u16 {
    9464
}

fn default_max_retries() -> u32 {
    3
}

fn default_inter_item_delay_ms() -> u64 {
    100
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_queue_size() -> usize {
    50
}

fn default_submit_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_history_size() -> usize {
    100
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.queue.inter_item_delay_ms, 100);
        assert_eq!(config.queue.max_queue_size, 50);
        assert_eq!(config.event_log.history_size, 100);
        assert!(config.backend.endpoint.is_none());
    }

    #[test]
    fn retry_delay_follows_mode() {
        let mut queue = QueueConfig {
            inter_item_delay_ms: 100,
            retry_delay_ms: 1000,
            ..QueueConfig::default()
        };
        assert_eq!(queue.retry_delay(), Duration::from_millis(1000));

        queue.retry_delay_mode = RetryDelayMode::InterItem;
        assert_eq!(queue.retry_delay(), Duration::from_millis(100));
    }

    #[test]
    fn null_timeout_disables_it() {
        let yaml = "queue:\n  submit_timeout_ms: null\n  retry_delay_mode: inter_item\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.queue.submit_timeout(), None);
        assert_eq!(config.queue.retry_delay_mode, RetryDelayMode::InterItem);
    }
}
