//! Error types for the answer queue.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("Failed to read answers from '{path}': {message}")]
    Answers { path: PathBuf, message: String },
}

/// Configuration loading and parsing errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {message}")]
    ParseFailed { path: PathBuf, message: String },

    #[error("Config validation failed with {error_count} error(s)")]
    ValidationFailed { error_count: usize },

    #[error("Failed to watch config file '{path}': {message}")]
    WatchFailed { path: PathBuf, message: String },
}

/// Queue construction and diagnostic errors.
///
/// Rejected enqueues and failed submissions are reported as state, not as
/// errors; these cover the few operations that can genuinely fail.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Submission queue must be created inside a Tokio runtime")]
    NoRuntime,

    #[error("Failed to export event log: {0}")]
    ExportFailed(String),
}

/// Errors returned by a submitter for a single attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Backend rejected submission with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Submission timed out after {millis} ms")]
    Timeout { millis: u64 },
}

impl SubmitError {
    /// HTTP-like status code, when the backend produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SubmitError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Transport(format!("request timed out: {}", e));
        }
        match e.status() {
            Some(status) => Self::Rejected {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => Self::Transport(e.to_string()),
        }
    }
}

/// Prometheus metrics errors.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Failed to register metric: {0}")]
    Registration(String),

    #[error("Prometheus metrics export failed: {0}")]
    Export(String),

    #[error("Metrics server failed: {0}")]
    Server(String),
}

impl From<prometheus::Error> for MetricsError {
    fn from(e: prometheus::Error) -> Self {
        Self::Registration(e.to_string())
    }
}
