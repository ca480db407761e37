//! In-memory queue store: ordered entries plus the per-question status map.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entry::{AnswerMetadata, QuestionId, QueueEntry, SubmissionStatus};

/// Why an enqueue was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The queue already holds `max_queue_size` entries.
    QueueFull,
    /// A submission for the same question is in flight.
    InFlight,
    /// The queue has been shut down.
    ShutDown,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::InFlight => "in_flight",
            Self::ShutDown => "shut_down",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an enqueue attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// A new entry was appended.
    Accepted { entry_id: String },
    /// A waiting entry for the same question was dropped in favor of the new one.
    Replaced { entry_id: String, previous_id: String },
    /// Nothing changed.
    Rejected(RejectReason),
}

impl EnqueueOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    /// Id of the entry created by this call, if any.
    pub fn entry_id(&self) -> Option<&str> {
        match self {
            Self::Accepted { entry_id } | Self::Replaced { entry_id, .. } => Some(entry_id),
            Self::Rejected(_) => None,
        }
    }
}

/// Ordered entries and the status of every question seen so far.
///
/// Status map entries are overwritten but never removed, so the last known
/// outcome of a question stays readable after its entry leaves the queue.
#[derive(Debug)]
pub struct QueueStore {
    entries: VecDeque<QueueEntry>,
    statuses: HashMap<QuestionId, SubmissionStatus>,
    max_queue_size: usize,
}

impl QueueStore {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            statuses: HashMap::new(),
            max_queue_size,
        }
    }

    /// Adds an answer to the tail, coalescing with any waiting entry for the same question.
    pub fn enqueue(
        &mut self,
        question_id: QuestionId,
        answer: Value,
        metadata: AnswerMetadata,
        max_retries: u32,
    ) -> EnqueueOutcome {
        if self.entries.len() >= self.max_queue_size {
            return EnqueueOutcome::Rejected(RejectReason::QueueFull);
        }

        if self.status_of(&question_id) == Some(SubmissionStatus::Processing) {
            return EnqueueOutcome::Rejected(RejectReason::InFlight);
        }

        let previous = self
            .position_of(&question_id)
            .and_then(|index| self.entries.remove(index));

        let entry = QueueEntry::new(question_id.clone(), answer, metadata, max_retries);
        let entry_id = entry.id.clone();
        self.entries.push_back(entry);
        self.statuses.insert(question_id, SubmissionStatus::Pending);

        match previous {
            Some(previous) => EnqueueOutcome::Replaced {
                entry_id,
                previous_id: previous.id,
            },
            None => EnqueueOutcome::Accepted { entry_id },
        }
    }

    /// First entry, if any.
    pub fn peek_head(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    /// Pops the first entry.
    pub fn remove_head(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// Counts a failed attempt against the head entry, which keeps its position.
    pub fn requeue_head_with_increment(&mut self) -> Option<&QueueEntry> {
        let head = self.entries.front_mut()?;
        head.retry_count = (head.retry_count + 1).min(head.max_retries);
        Some(head)
    }

    pub fn set_status(&mut self, question_id: &QuestionId, status: SubmissionStatus) {
        self.statuses.insert(question_id.clone(), status);
    }

    pub fn status_of(&self, question_id: &QuestionId) -> Option<SubmissionStatus> {
        self.statuses.get(question_id).copied()
    }

    pub fn statuses(&self) -> &HashMap<QuestionId, SubmissionStatus> {
        &self.statuses
    }

    /// Position of the live entry for a question.
    pub fn position_of(&self, question_id: &QuestionId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| &entry.question_id == question_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Changes the capacity. Entries beyond a smaller capacity stay and drain normally.
    pub fn set_max_queue_size(&mut self, max_queue_size: usize) {
        self.max_queue_size = max_queue_size;
    }
}
