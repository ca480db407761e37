//! Bounded history of queue lifecycle events and the stats derived from it.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::{QuestionId, SubmissionStatus};
use super::store::RejectReason;

/// What happened to an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueEventKind {
    Enqueued,
    /// A waiting entry for the same question was superseded.
    Replaced { previous_id: String },
    Rejected { reason: RejectReason },
    Started { attempt: u32 },
    Succeeded { latency_ms: i64 },
    Retrying { retry_count: u32, error: String },
    Failed { attempts: u32, error: String },
    /// The answer did not fit its question type and was defaulted.
    Coerced { detail: String },
}

/// One recorded lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEvent {
    pub at: DateTime<Utc>,
    pub question_id: QuestionId,
    /// Absent for rejected enqueues, which never create an entry.
    pub entry_id: Option<String>,
    #[serde(flatten)]
    pub kind: QueueEventKind,
}

/// Rolling event history; the oldest events are dropped first.
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<QueueEvent>,
    capacity: usize,
    enabled: bool,
}

impl EventLog {
    pub fn new(capacity: usize, enabled: bool) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            enabled,
        }
    }

    pub fn record(&mut self, question_id: &QuestionId, entry_id: Option<&str>, kind: QueueEventKind) {
        if !self.enabled || self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(QueueEvent {
            at: Utc::now(),
            question_id: question_id.clone(),
            entry_id: entry_id.map(str::to_string),
            kind,
        });
    }

    pub fn events(&self) -> impl Iterator<Item = &QueueEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Applies new settings, trimming the oldest events if the capacity shrank.
    pub fn reconfigure(&mut self, capacity: usize, enabled: bool) {
        self.capacity = capacity;
        self.enabled = enabled;
        while self.events.len() > capacity {
            self.events.pop_front();
        }
    }

    /// Counts outcomes across the retained history.
    pub fn tally(&self) -> EventTally {
        self.events
            .iter()
            .fold(EventTally::default(), |mut tally, event| {
                match event.kind {
                    QueueEventKind::Succeeded { .. } => tally.successes += 1,
                    QueueEventKind::Failed { .. } => tally.errors += 1,
                    QueueEventKind::Retrying { .. } => tally.retries += 1,
                    _ => {}
                }
                tally
            })
    }
}

/// Outcome counts over the event history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventTally {
    pub successes: usize,
    pub errors: usize,
    pub retries: usize,
}

/// Diagnostic snapshot returned by [`crate::queue::SubmissionQueue::stats`].
///
/// The totals cover the retained history only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_processed: usize,
    pub total_errors: usize,
    pub total_retries: usize,
    pub current_queue_length: usize,
    pub processing_state_counts: BTreeMap<SubmissionStatus, usize>,
}
