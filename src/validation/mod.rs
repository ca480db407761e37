//! Configuration checks run before a config is loaded or hot-reloaded.

pub mod semantic;

use std::fmt;

use crate::config::model::AppConfig;

/// Config settings the checks can report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    LogLevel,
    PrometheusPort,
    MaxRetries,
    InterItemDelay,
    RetryDelay,
    MaxQueueSize,
    SubmitTimeout,
    HistorySize,
    Endpoint,
    FailEvery,
    Diagnostics,
}

impl ConfigField {
    /// Location of the setting in the YAML file.
    pub fn path(self) -> &'static str {
        match self {
            Self::LogLevel => "global.log_level",
            Self::PrometheusPort => "global.prometheus.port",
            Self::MaxRetries => "queue.max_retries",
            Self::InterItemDelay => "queue.inter_item_delay_ms",
            Self::RetryDelay => "queue.retry_delay_ms",
            Self::MaxQueueSize => "queue.max_queue_size",
            Self::SubmitTimeout => "queue.submit_timeout_ms",
            Self::HistorySize => "event_log.history_size",
            Self::Endpoint => "backend.endpoint",
            Self::FailEvery => "diagnostics.fail_every",
            Self::Diagnostics => "diagnostics",
        }
    }
}

/// Whether an issue keeps the config from being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Reject,
    Warn,
}

/// A problem with one setting.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub field: ConfigField,
    pub severity: Severity,
    pub message: String,
    pub hint: Option<String>,
}

impl ConfigIssue {
    pub fn reject(field: ConfigField, message: impl Into<String>) -> Self {
        Self {
            field,
            severity: Severity::Reject,
            message: message.into(),
            hint: None,
        }
    }

    pub fn warn(field: ConfigField, message: impl Into<String>) -> Self {
        Self {
            field,
            severity: Severity::Warn,
            message: message.into(),
            hint: None,
        }
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field.path(), self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " ({})", hint)?;
        }
        Ok(())
    }
}

/// Everything found wrong with one config.
#[derive(Debug, Default)]
pub struct ConfigReport {
    issues: Vec<ConfigIssue>,
}

impl ConfigReport {
    pub fn push(&mut self, issue: ConfigIssue) {
        self.issues.push(issue);
    }

    /// No rejecting issues; warnings are allowed.
    pub fn is_valid(&self) -> bool {
        self.rejections().next().is_none()
    }

    pub fn rejections(&self) -> impl Iterator<Item = &ConfigIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Reject)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ConfigIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warn)
    }

    pub fn rejection_count(&self) -> usize {
        self.rejections().count()
    }
}

impl fmt::Display for ConfigReport {
    /// Lists rejections only; warnings are logged one by one.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} setting(s) rejected", self.rejection_count())?;
        for issue in self.rejections() {
            write!(f, "\n  - {}", issue)?;
        }
        Ok(())
    }
}

/// Checks every section. A missing endpoint is only an issue when `require_endpoint` is set.
pub fn validate_config(config: &AppConfig, require_endpoint: bool) -> ConfigReport {
    let mut report = ConfigReport::default();
    semantic::check_global(&config.global, &mut report);
    semantic::check_queue(&config.queue, &mut report);
    semantic::check_event_log(&config.event_log, &mut report);
    semantic::check_backend(&config.backend, require_endpoint, &mut report);
    semantic::check_diagnostics(&config.diagnostics, &mut report);
    report
}
