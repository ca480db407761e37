//! Lag and failure injection around another submitter.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::Submitter;
use crate::config::model::DiagnosticsConfig;
use crate::error::SubmitError;
use crate::queue::SubmissionPayload;

/// Status reported for injected failures.
pub const INJECTED_FAILURE_STATUS: u16 = 503;

/// Wraps a submitter with fixed extra latency and periodic failures.
pub struct LaggedSubmitter<S> {
    inner: S,
    lag: Duration,
    fail_every: u32,
    calls: AtomicU32,
}

impl<S: Submitter> LaggedSubmitter<S> {
    pub fn new(inner: S, lag: Duration, fail_every: u32) -> Self {
        Self {
            inner,
            lag,
            fail_every,
            calls: AtomicU32::new(0),
        }
    }

    pub fn from_config(inner: S, config: &DiagnosticsConfig) -> Self {
        Self::new(
            inner,
            Duration::from_millis(config.simulated_lag_ms),
            config.fail_every,
        )
    }

    /// Number of submit calls seen so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: Submitter> Submitter for LaggedSubmitter<S> {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<(), SubmitError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.lag.is_zero() {
            tokio::time::sleep(self.lag).await;
        }

        if self.fail_every > 0 && call % self.fail_every == 0 {
            debug!(question_id = %payload.question_id, call, "Injecting submission failure");
            return Err(SubmitError::Rejected {
                status: INJECTED_FAILURE_STATUS,
                message: format!("injected failure on call {}", call),
            });
        }

        self.inner.submit(payload).await
    }
}
