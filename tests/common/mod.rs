#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use answer_queue::config::model::{QueueConfig, RetryDelayMode};
use answer_queue::error::SubmitError;
use answer_queue::queue::{
    AnswerMetadata, QuestionId, QueueEventKind, SubmissionPayload, SubmissionQueue,
    SubmissionStatus,
};
use answer_queue::submit::Submitter;
use async_trait::async_trait;
use mockall::mock;
use serde_json::{json, Map};
use tokio::sync::Semaphore;

const SETTLE_LIMIT: Duration = Duration::from_secs(5);

mock! {
    pub Backend {}

    #[async_trait]
    impl Submitter for Backend {
        async fn submit(&self, payload: &SubmissionPayload) -> Result<(), SubmitError>;
    }
}

/// Queue settings with near-zero delays.
pub fn fast_config(max_retries: u32) -> QueueConfig {
    QueueConfig {
        max_retries,
        inter_item_delay_ms: 1,
        retry_delay_ms: 1,
        retry_delay_mode: RetryDelayMode::Distinct,
        max_queue_size: 50,
        submit_timeout_ms: Some(2_000),
    }
}

pub fn metadata(question_type: &str) -> AnswerMetadata {
    let mut m = Map::new();
    m.insert("question_type".to_string(), json!(question_type));
    m.insert("user_id".to_string(), json!(17));
    m.insert("questionnaire_id".to_string(), json!(3));
    m
}

pub fn backend_error() -> SubmitError {
    SubmitError::Rejected {
        status: 500,
        message: "internal error".to_string(),
    }
}

pub async fn settle(queue: &SubmissionQueue) {
    tokio::time::timeout(SETTLE_LIMIT, queue.wait_idle())
        .await
        .expect("queue did not settle");
}

pub async fn wait_for_status(queue: &SubmissionQueue, question_id: &str, status: SubmissionStatus) {
    let question_id = QuestionId::new(question_id);
    let mut rx = queue.subscribe();
    tokio::time::timeout(
        SETTLE_LIMIT,
        rx.wait_for(|s| s.statuses.get(&question_id) == Some(&status)),
    )
    .await
    .expect("status never reached")
    .expect("queue dropped");
}

/// Statuses implied by the event log for one question, in order.
pub fn status_trail(queue: &SubmissionQueue, question_id: &str) -> Vec<SubmissionStatus> {
    queue
        .events()
        .into_iter()
        .filter(|e| e.question_id.as_str() == question_id)
        .filter_map(|e| match e.kind {
            QueueEventKind::Enqueued | QueueEventKind::Replaced { .. } => {
                Some(SubmissionStatus::Pending)
            }
            QueueEventKind::Started { .. } => Some(SubmissionStatus::Processing),
            QueueEventKind::Retrying { .. } => Some(SubmissionStatus::Retrying),
            QueueEventKind::Succeeded { .. } => Some(SubmissionStatus::Success),
            QueueEventKind::Failed { .. } => Some(SubmissionStatus::Error),
            QueueEventKind::Rejected { .. } | QueueEventKind::Coerced { .. } => None,
        })
        .collect()
}

/// Fails the first N calls per question, records call order.
#[derive(Default)]
pub struct ScriptedSubmitter {
    failures: Mutex<HashMap<String, u32>>,
    calls: Arc<Mutex<Vec<SubmissionPayload>>>,
}

impl ScriptedSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(self, question_id: &str, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(question_id.to_string(), times);
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<SubmissionPayload>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Submitter for ScriptedSubmitter {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<(), SubmitError> {
        self.calls.lock().unwrap().push(payload.clone());
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(payload.question_id.as_str()) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(backend_error())
            }
            _ => Ok(()),
        }
    }
}

/// Holds every call until a permit is released.
pub struct GatedSubmitter {
    gate: Arc<Semaphore>,
    calls: Arc<Mutex<Vec<SubmissionPayload>>>,
}

impl GatedSubmitter {
    pub fn new() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                gate: Arc::clone(&gate),
                calls: Arc::new(Mutex::new(Vec::new())),
            },
            gate,
        )
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<SubmissionPayload>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Submitter for GatedSubmitter {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<(), SubmitError> {
        self.calls.lock().unwrap().push(payload.clone());
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;
        permit.forget();
        Ok(())
    }
}

pub fn called_ids(calls: &Mutex<Vec<SubmissionPayload>>) -> Vec<String> {
    calls
        .lock()
        .unwrap()
        .iter()
        .map(|p| p.question_id.as_str().to_string())
        .collect()
}
