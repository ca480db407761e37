//! Delivery of transformed answers to the backend.
//!
//! The queue only knows the [`Submitter`] trait; HTTP details live in
//! [`HttpSubmitter`].

pub mod http;
pub mod lag;

use async_trait::async_trait;
use tracing::info;

use crate::error::SubmitError;
use crate::queue::SubmissionPayload;

pub use http::HttpSubmitter;
pub use lag::LaggedSubmitter;

/// Sends one answer to the backend.
///
/// Resolves on acceptance and fails with an inspectable [`SubmitError`]
/// otherwise. Implementations must not retry on their own; the queue owns
/// the retry policy.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<(), SubmitError>;
}

#[async_trait]
impl<S: Submitter + ?Sized> Submitter for std::sync::Arc<S> {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<(), SubmitError> {
        (**self).submit(payload).await
    }
}

#[async_trait]
impl<S: Submitter + ?Sized> Submitter for Box<S> {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<(), SubmitError> {
        (**self).submit(payload).await
    }
}

/// Accepts everything without network access.
#[derive(Debug, Default, Clone)]
pub struct DryRunSubmitter;

#[async_trait]
impl Submitter for DryRunSubmitter {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<(), SubmitError> {
        info!(
            question_id = %payload.question_id,
            answer = %payload.answer,
            "Dry run: submission accepted"
        );
        Ok(())
    }
}
