//! In-memory answer submission queue.

pub mod entry;
pub mod events;
pub mod processor;
pub mod store;
pub mod transform;

pub use entry::{AnswerMetadata, QuestionId, QueueEntry, SubmissionPayload, SubmissionStatus};
pub use events::{QueueEvent, QueueEventKind, QueueStats};
pub use processor::{QueueBuilder, QueueSnapshot, SubmissionQueue};
pub use store::{EnqueueOutcome, RejectReason};
pub use transform::{transform_answer, QuestionType, Transformed};
