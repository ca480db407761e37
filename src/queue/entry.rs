//! Queue entry definitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Identifier of the question being answered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(String);

impl QuestionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QuestionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for QuestionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Contextual data needed to build a submission (user, questionnaire, question type).
///
/// Passed through to the submitter unmodified.
pub type AnswerMetadata = Map<String, Value>;

/// One pending submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique identifier, derived from the question id and creation time.
    pub id: String,

    /// Question being answered.
    pub question_id: QuestionId,

    /// Raw answer as produced by the form.
    pub answer: Value,

    /// Opaque submission context.
    pub metadata: AnswerMetadata,

    /// Timestamp when the entry was created.
    pub enqueued_at: DateTime<Utc>,

    /// Failed attempts so far.
    pub retry_count: u32,

    /// Retry ceiling copied from configuration at creation.
    pub max_retries: u32,
}

impl QueueEntry {
    /// Creates a fresh entry with no failed attempts.
    pub fn new(
        question_id: QuestionId,
        answer: Value,
        metadata: AnswerMetadata,
        max_retries: u32,
    ) -> Self {
        let enqueued_at = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            id: format!(
                "{}-{}-{}",
                question_id,
                enqueued_at.timestamp_millis(),
                &suffix[..8]
            ),
            question_id,
            answer,
            metadata,
            enqueued_at,
            retry_count: 0,
            max_retries,
        }
    }

    /// Attempt number of the next submission (1-based).
    pub fn attempt(&self) -> u32 {
        self.retry_count + 1
    }

    /// Returns true if another failure may still be retried.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Milliseconds since the entry was created.
    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.enqueued_at).num_milliseconds()
    }
}

/// Submission status of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    /// Waiting in the queue.
    Pending,
    /// Submit call in flight.
    Processing,
    /// Last attempt failed; waiting at the head for another attempt.
    Retrying,
    /// Accepted by the backend.
    Success,
    /// Retries exhausted. Not attempted again unless re-enqueued.
    Error,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Retrying => "retrying",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body handed to the submitter for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub question_id: QuestionId,
    /// Answer after type-specific transformation.
    pub answer: Value,
    pub metadata: AnswerMetadata,
}
