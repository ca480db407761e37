//! Sequential processor: drains the queue one submission at a time.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use super::entry::{AnswerMetadata, QuestionId, QueueEntry, SubmissionPayload, SubmissionStatus};
use super::events::{EventLog, QueueEvent, QueueEventKind, QueueStats};
use super::store::{EnqueueOutcome, QueueStore, RejectReason};
use super::transform::{transform_answer, QuestionType};
use crate::config::model::{EventLogConfig, QueueConfig};
use crate::error::{QueueError, SubmitError};
use crate::notify::prometheus::Metrics;
use crate::submit::Submitter;

/// Read-only view of the queue, republished on every state change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueSnapshot {
    pub queue_length: usize,
    pub is_processing: bool,
    pub is_shut_down: bool,
    pub statuses: HashMap<QuestionId, SubmissionStatus>,
}

impl QueueSnapshot {
    /// Nothing waiting that will still be attempted, and nothing in flight.
    pub fn is_idle(&self) -> bool {
        !self.is_processing && (self.queue_length == 0 || self.is_shut_down)
    }
}

struct QueueState {
    store: QueueStore,
    log: EventLog,
    config: QueueConfig,
    in_flight: bool,
    wake_armed: bool,
    shut_down: bool,
}

impl QueueState {
    /// Claims the single pending wake-up slot.
    fn arm_wake(&mut self) -> bool {
        if self.in_flight || self.wake_armed || self.shut_down || self.store.is_empty() {
            return false;
        }
        self.wake_armed = true;
        true
    }
}

struct Inner {
    state: Mutex<QueueState>,
    submitter: Arc<dyn Submitter>,
    runtime: Handle,
    snapshot_tx: watch::Sender<QueueSnapshot>,
    metrics: Option<Arc<Metrics>>,
}

/// Builder for [`SubmissionQueue`].
pub struct QueueBuilder {
    config: QueueConfig,
    event_log: EventLogConfig,
    submitter: Arc<dyn Submitter>,
    metrics: Option<Arc<Metrics>>,
}

impl QueueBuilder {
    pub fn event_log(mut self, event_log: EventLogConfig) -> Self {
        self.event_log = event_log;
        self
    }

    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the queue on the current Tokio runtime.
    pub fn build(self) -> Result<SubmissionQueue, QueueError> {
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;

        let state = QueueState {
            store: QueueStore::new(self.config.max_queue_size),
            log: EventLog::new(self.event_log.history_size, self.event_log.enabled),
            config: self.config,
            in_flight: false,
            wake_armed: false,
            shut_down: false,
        };
        let (snapshot_tx, _) = watch::channel(QueueSnapshot::default());

        Ok(SubmissionQueue {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                submitter: self.submitter,
                runtime,
                snapshot_tx,
                metrics: self.metrics,
            }),
        })
    }
}

/// Ordered, retrying delivery pipeline for questionnaire answers.
///
/// Cloning yields another handle to the same queue. At most one submission
/// is in flight at any time; retried entries keep the head of the queue.
#[derive(Clone)]
pub struct SubmissionQueue {
    inner: Arc<Inner>,
}

impl SubmissionQueue {
    /// Creates a queue with the default event log settings.
    pub fn new<S: Submitter + 'static>(
        config: QueueConfig,
        submitter: S,
    ) -> Result<Self, QueueError> {
        Self::builder(config, submitter).build()
    }

    pub fn builder<S: Submitter + 'static>(config: QueueConfig, submitter: S) -> QueueBuilder {
        QueueBuilder {
            config,
            event_log: EventLogConfig::default(),
            submitter: Arc::new(submitter),
            metrics: None,
        }
    }

    /// Offers an answer to the queue. Returns false if it was refused.
    pub fn enqueue(
        &self,
        question_id: impl Into<QuestionId>,
        answer: Value,
        metadata: AnswerMetadata,
    ) -> bool {
        self.try_enqueue(question_id, answer, metadata).is_accepted()
    }

    /// Offers an answer to the queue, reporting what happened.
    ///
    /// The queue state reflects the outcome as soon as this returns; the
    /// submission itself happens on a later task.
    pub fn try_enqueue(
        &self,
        question_id: impl Into<QuestionId>,
        answer: Value,
        metadata: AnswerMetadata,
    ) -> EnqueueOutcome {
        let question_id = question_id.into();

        let (outcome, wake) = {
            let mut state = self.lock();
            let outcome = if state.shut_down {
                EnqueueOutcome::Rejected(RejectReason::ShutDown)
            } else {
                let max_retries = state.config.max_retries;
                state
                    .store
                    .enqueue(question_id.clone(), answer, metadata, max_retries)
            };

            match &outcome {
                EnqueueOutcome::Accepted { entry_id } => {
                    state
                        .log
                        .record(&question_id, Some(entry_id), QueueEventKind::Enqueued);
                }
                EnqueueOutcome::Replaced {
                    entry_id,
                    previous_id,
                } => {
                    state.log.record(
                        &question_id,
                        Some(entry_id),
                        QueueEventKind::Replaced {
                            previous_id: previous_id.clone(),
                        },
                    );
                }
                EnqueueOutcome::Rejected(reason) => {
                    state.log.record(
                        &question_id,
                        None,
                        QueueEventKind::Rejected { reason: *reason },
                    );
                }
            }

            let wake = state.arm_wake();
            self.publish(&state);
            (outcome, wake)
        };

        match &outcome {
            EnqueueOutcome::Accepted { entry_id } => {
                debug!(question_id = %question_id, entry_id = %entry_id, "Answer enqueued");
            }
            EnqueueOutcome::Replaced {
                entry_id,
                previous_id,
            } => {
                debug!(
                    question_id = %question_id,
                    entry_id = %entry_id,
                    previous_id = %previous_id,
                    "Waiting answer replaced"
                );
            }
            EnqueueOutcome::Rejected(reason) => {
                warn!(question_id = %question_id, reason = %reason, "Answer rejected by queue");
                if let Some(metrics) = &self.inner.metrics {
                    metrics.record_rejection(reason.as_str());
                }
            }
        }

        if wake {
            self.spawn_cycle(Duration::ZERO);
        }

        outcome
    }

    /// Number of entries waiting, including a retrying or in-flight head.
    pub fn queue_length(&self) -> usize {
        self.lock().store.len()
    }

    /// True while a submit call is in flight.
    pub fn is_processing(&self) -> bool {
        self.lock().in_flight
    }

    /// Last known status of a question.
    pub fn status_of(&self, question_id: &QuestionId) -> Option<SubmissionStatus> {
        self.lock().store.status_of(question_id)
    }

    /// Copy of the full status map.
    pub fn statuses(&self) -> HashMap<QuestionId, SubmissionStatus> {
        self.lock().store.statuses().clone()
    }

    /// Entries currently in the queue, head first.
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.lock().store.entries().cloned().collect()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Resolves once the queue is drained and nothing is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(QueueSnapshot::is_idle).await;
    }

    /// Outcome counts from the event log plus the live status distribution.
    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        let tally = state.log.tally();

        let mut processing_state_counts = BTreeMap::new();
        for status in state.store.statuses().values() {
            *processing_state_counts.entry(*status).or_insert(0) += 1;
        }

        QueueStats {
            total_processed: tally.successes,
            total_errors: tally.errors,
            total_retries: tally.retries,
            current_queue_length: state.store.len(),
            processing_state_counts,
        }
    }

    /// Retained lifecycle events, oldest first.
    pub fn events(&self) -> Vec<QueueEvent> {
        self.lock().log.events().cloned().collect()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    /// Retained lifecycle events as pretty-printed JSON.
    pub fn export_log(&self) -> Result<String, QueueError> {
        let events = self.events();
        serde_json::to_string_pretty(&events).map_err(|e| QueueError::ExportFailed(e.to_string()))
    }

    /// Current queue configuration.
    pub fn config(&self) -> QueueConfig {
        self.lock().config.clone()
    }

    /// Applies new settings. Entries already queued keep their retry ceiling.
    pub fn reconfigure(&self, config: QueueConfig, event_log: EventLogConfig) {
        let mut state = self.lock();
        state.store.set_max_queue_size(config.max_queue_size);
        state
            .log
            .reconfigure(event_log.history_size, event_log.enabled);
        info!(
            max_retries = config.max_retries,
            max_queue_size = config.max_queue_size,
            inter_item_delay_ms = config.inter_item_delay_ms,
            "Queue reconfigured"
        );
        state.config = config;
        self.publish(&state);
    }

    /// Stops accepting answers and starting attempts. An attempt already in
    /// flight completes and records its outcome.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.shut_down = true;
        info!(remaining = state.store.len(), "Submission queue shut down");
        self.publish(&state);
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &QueueState) {
        let snapshot = QueueSnapshot {
            queue_length: state.store.len(),
            is_processing: state.in_flight,
            is_shut_down: state.shut_down,
            statuses: state.store.statuses().clone(),
        };
        if let Some(metrics) = &self.inner.metrics {
            metrics.set_queue_state(snapshot.queue_length, snapshot.is_processing);
        }
        self.inner.snapshot_tx.send_replace(snapshot);
    }

    fn spawn_cycle(&self, delay: Duration) {
        let queue = self.clone();
        self.inner.runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            queue.run_cycle().await;
        });
    }

    /// Attempts the head entry once. No-op if busy, empty or shut down.
    async fn run_cycle(&self) {
        let (entry, payload, timeout) = {
            let mut state = self.lock();
            state.wake_armed = false;
            if state.in_flight || state.shut_down {
                return;
            }
            let Some(entry) = state.store.peek_head().cloned() else {
                return;
            };

            state.in_flight = true;
            state
                .store
                .set_status(&entry.question_id, SubmissionStatus::Processing);
            state.log.record(
                &entry.question_id,
                Some(&entry.id),
                QueueEventKind::Started {
                    attempt: entry.attempt(),
                },
            );

            // Re-derived on every attempt from the entry's current metadata.
            let question_type = QuestionType::from_metadata(&entry.metadata);
            let transformed = transform_answer(&question_type, &entry.answer);
            if let Some(coercion) = &transformed.coercion {
                warn!(
                    question_id = %entry.question_id,
                    question_type = %coercion.question_type,
                    original = %coercion.original,
                    replacement = %coercion.replacement,
                    "Malformed answer coerced"
                );
                state.log.record(
                    &entry.question_id,
                    Some(&entry.id),
                    QueueEventKind::Coerced {
                        detail: coercion.to_string(),
                    },
                );
                if let Some(metrics) = &self.inner.metrics {
                    metrics.record_coercion(&question_type.to_string());
                }
            }

            let payload = SubmissionPayload {
                question_id: entry.question_id.clone(),
                answer: transformed.value,
                metadata: entry.metadata.clone(),
            };
            let timeout = state.config.submit_timeout();
            self.publish(&state);
            (entry, payload, timeout)
        };

        info!(
            question_id = %entry.question_id,
            entry_id = %entry.id,
            attempt = entry.attempt(),
            "Submitting answer"
        );

        let started = Instant::now();
        let result = self.submit(payload, timeout).await;
        let elapsed = started.elapsed();

        if let Some(delay) = self.finish_attempt(&entry, result, elapsed) {
            self.spawn_cycle(delay);
        }
    }

    /// Runs the submit call on its own task so a panicking submitter cannot
    /// leave the in-flight flag set.
    async fn submit(
        &self,
        payload: SubmissionPayload,
        timeout: Option<Duration>,
    ) -> Result<(), SubmitError> {
        let submitter = Arc::clone(&self.inner.submitter);
        let mut handle = self
            .inner
            .runtime
            .spawn(async move { submitter.submit(&payload).await });

        match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => flatten_join(joined),
                Err(_) => {
                    handle.abort();
                    Err(SubmitError::Timeout {
                        millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    })
                }
            },
            None => flatten_join(handle.await),
        }
    }

    /// Records the outcome of an attempt and returns the delay before the
    /// next cycle, if one should be armed.
    fn finish_attempt(
        &self,
        entry: &QueueEntry,
        result: Result<(), SubmitError>,
        elapsed: Duration,
    ) -> Option<Duration> {
        let mut state = self.lock();
        state.in_flight = false;

        let head_matches = state
            .store
            .peek_head()
            .map(|head| head.id == entry.id)
            .unwrap_or(false);
        if !head_matches {
            error!(
                question_id = %entry.question_id,
                entry_id = %entry.id,
                "In-flight entry is no longer at the head of the queue"
            );
        }

        let (outcome, delay) = match result {
            Ok(()) => {
                if head_matches {
                    state.store.remove_head();
                }
                state
                    .store
                    .set_status(&entry.question_id, SubmissionStatus::Success);
                let latency_ms = entry.age_ms();
                state.log.record(
                    &entry.question_id,
                    Some(&entry.id),
                    QueueEventKind::Succeeded { latency_ms },
                );
                info!(
                    question_id = %entry.question_id,
                    entry_id = %entry.id,
                    attempt = entry.attempt(),
                    latency_ms,
                    "Answer submitted"
                );
                ("success", state.config.inter_item_delay())
            }
            Err(e) if entry.can_retry() => {
                let retry_count = if head_matches {
                    state
                        .store
                        .requeue_head_with_increment()
                        .map(|head| head.retry_count)
                        .unwrap_or(entry.retry_count + 1)
                } else {
                    entry.retry_count + 1
                };
                state
                    .store
                    .set_status(&entry.question_id, SubmissionStatus::Retrying);
                state.log.record(
                    &entry.question_id,
                    Some(&entry.id),
                    QueueEventKind::Retrying {
                        retry_count,
                        error: e.to_string(),
                    },
                );
                warn!(
                    question_id = %entry.question_id,
                    entry_id = %entry.id,
                    retry_count,
                    max_retries = entry.max_retries,
                    status = ?e.status(),
                    error = %e,
                    "Submission failed, will retry"
                );
                ("retry", state.config.retry_delay())
            }
            Err(e) => {
                if head_matches {
                    state.store.remove_head();
                }
                state
                    .store
                    .set_status(&entry.question_id, SubmissionStatus::Error);
                state.log.record(
                    &entry.question_id,
                    Some(&entry.id),
                    QueueEventKind::Failed {
                        attempts: entry.attempt(),
                        error: e.to_string(),
                    },
                );
                error!(
                    question_id = %entry.question_id,
                    entry_id = %entry.id,
                    attempts = entry.attempt(),
                    status = ?e.status(),
                    error = %e,
                    "Submission failed permanently"
                );
                ("error", state.config.inter_item_delay())
            }
        };

        if let Some(metrics) = &self.inner.metrics {
            metrics.record_attempt(outcome, elapsed.as_secs_f64());
        }

        let wake = state.arm_wake();
        self.publish(&state);
        wake.then_some(delay)
    }
}

fn flatten_join(joined: Result<Result<(), SubmitError>, JoinError>) -> Result<(), SubmitError> {
    joined.unwrap_or_else(|e| Err(SubmitError::Transport(format!("submit task failed: {}", e))))
}
