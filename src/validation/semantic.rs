//! Per-section checks for configuration values.

use crate::config::model::{
    BackendConfig, DiagnosticsConfig, EventLogConfig, GlobalConfig, QueueConfig, RetryDelayMode,
};

use super::{ConfigField, ConfigIssue, ConfigReport};

/// Inter-item delays above this are almost certainly a unit mistake.
const MAX_SENSIBLE_DELAY_MS: u64 = 60_000;

const MAX_SENSIBLE_RETRIES: u32 = 20;

pub const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub fn check_global(global: &GlobalConfig, report: &mut ConfigReport) {
    if !VALID_LOG_LEVELS.contains(&global.log_level.to_lowercase().as_str()) {
        report.push(
            ConfigIssue::reject(
                ConfigField::LogLevel,
                format!("Unknown log level '{}'", global.log_level),
            )
            .hint(format!("use one of: {}", VALID_LOG_LEVELS.join(", "))),
        );
    }

    if global.prometheus.enabled && global.prometheus.port == 0 {
        report.push(ConfigIssue::reject(
            ConfigField::PrometheusPort,
            "Prometheus port must be non-zero when metrics are enabled",
        ));
    }
}

pub fn check_queue(queue: &QueueConfig, report: &mut ConfigReport) {
    let defaults = QueueConfig::default();

    if queue.max_queue_size == 0 {
        report.push(
            ConfigIssue::reject(ConfigField::MaxQueueSize, "Queue size must be at least 1")
                .hint(format!("the default is {}", defaults.max_queue_size)),
        );
    }

    if queue.inter_item_delay_ms > MAX_SENSIBLE_DELAY_MS {
        report.push(ConfigIssue::warn(
            ConfigField::InterItemDelay,
            format!(
                "Inter-item delay of {} ms will make the queue drain very slowly",
                queue.inter_item_delay_ms
            ),
        ));
    }

    if queue.retry_delay_mode == RetryDelayMode::Distinct && queue.retry_delay_ms == 0 {
        report.push(
            ConfigIssue::warn(
                ConfigField::RetryDelay,
                "Retries will be attempted immediately after a failure",
            )
            .hint("set retry_delay_mode: inter_item to reuse the inter-item delay"),
        );
    }

    if queue.submit_timeout_ms == Some(0) {
        report.push(
            ConfigIssue::reject(
                ConfigField::SubmitTimeout,
                "A zero timeout fails every submission",
            )
            .hint("use null to disable the timeout"),
        );
    }

    if queue.max_retries > MAX_SENSIBLE_RETRIES {
        report.push(ConfigIssue::warn(
            ConfigField::MaxRetries,
            format!(
                "{} retries can hold the head of the queue for {:?} or more",
                queue.max_retries,
                queue.retry_delay() * queue.max_retries
            ),
        ));
    }
}

pub fn check_event_log(log: &EventLogConfig, report: &mut ConfigReport) {
    if log.enabled && log.history_size == 0 {
        report.push(
            ConfigIssue::reject(
                ConfigField::HistorySize,
                "History size must be at least 1 when the event log is enabled",
            )
            .hint("set event_log.enabled: false to turn recording off"),
        );
    }
}

pub fn check_backend(backend: &BackendConfig, require_endpoint: bool, report: &mut ConfigReport) {
    match &backend.endpoint {
        Some(endpoint) if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) => {
            report.push(ConfigIssue::reject(
                ConfigField::Endpoint,
                format!("Endpoint '{}' is not an HTTP URL", endpoint),
            ));
        }
        None if require_endpoint => {
            report.push(
                ConfigIssue::reject(ConfigField::Endpoint, "No submission endpoint configured")
                    .hint("set backend.endpoint or pass --dry-run"),
            );
        }
        _ => {}
    }
}

pub fn check_diagnostics(diagnostics: &DiagnosticsConfig, report: &mut ConfigReport) {
    if diagnostics.fail_every == 1 {
        report.push(ConfigIssue::warn(
            ConfigField::FailEvery,
            "Every submission will fail",
        ));
    }

    if diagnostics.is_active() {
        report.push(ConfigIssue::warn(
            ConfigField::Diagnostics,
            "Lag or failure injection is active",
        ));
    }
}
