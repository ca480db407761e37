mod common;

use std::time::Duration;

use answer_queue::config::model::RetryDelayMode;
use answer_queue::queue::{
    EnqueueOutcome, QuestionId, RejectReason, SubmissionPayload, SubmissionQueue,
    SubmissionStatus,
};
use common::*;
use serde_json::{json, Map};
use tokio::time::Instant;

use SubmissionStatus::{Error, Pending, Processing, Retrying, Success};

#[tokio::test]
async fn only_latest_pending_answer_survives() {
    let submitter = ScriptedSubmitter::new();
    let calls = submitter.calls();
    let queue = SubmissionQueue::new(fast_config(3), submitter).unwrap();

    // Nothing runs until this task yields, so every entry is still pending.
    assert!(queue.enqueue("q1", json!("first"), metadata("texto")));
    assert!(queue.enqueue("q2", json!("other"), Map::new()));
    assert!(queue.enqueue("q1", json!("second"), metadata("texto")));
    let outcome = queue.try_enqueue("q1", json!("third"), metadata("desplegable"));
    assert!(matches!(outcome, EnqueueOutcome::Replaced { .. }));

    let entries = queue.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].question_id, QuestionId::new("q2"));
    assert_eq!(entries[1].answer, json!("third"));
    assert_eq!(entries[1].metadata, metadata("desplegable"));
    assert_eq!(queue.status_of(&QuestionId::new("q1")), Some(Pending));

    settle(&queue).await;

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].answer, json!("third"));
}

#[tokio::test]
async fn in_flight_question_cannot_be_enqueued() {
    let (submitter, gate) = GatedSubmitter::new();
    let calls = submitter.calls();
    let queue = SubmissionQueue::new(fast_config(3), submitter).unwrap();

    assert!(queue.enqueue("q1", json!(1), Map::new()));
    wait_for_status(&queue, "q1", Processing).await;
    assert!(queue.is_processing());

    let before = queue.entries();
    let outcome = queue.try_enqueue("q1", json!(2), Map::new());
    assert_eq!(outcome, EnqueueOutcome::Rejected(RejectReason::InFlight));
    assert!(!queue.enqueue("q1", json!(3), Map::new()));

    let after = queue.entries();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, before[0].id);
    assert_eq!(after[0].answer, json!(1));

    gate.add_permits(1);
    settle(&queue).await;

    assert_eq!(queue.status_of(&QuestionId::new("q1")), Some(Success));
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn full_queue_rejects_further_answers() {
    let mut config = fast_config(3);
    config.max_queue_size = 3;
    let queue = SubmissionQueue::new(config, ScriptedSubmitter::new()).unwrap();

    for q in ["a", "b", "c"] {
        assert!(queue.enqueue(q, json!(q), Map::new()));
    }
    assert_eq!(queue.queue_length(), 3);

    assert!(!queue.enqueue("d", json!("d"), Map::new()));
    // Capacity is checked before coalescing, so even a replacement is refused.
    assert_eq!(
        queue.try_enqueue("a", json!("a2"), Map::new()),
        EnqueueOutcome::Rejected(RejectReason::QueueFull)
    );
    assert_eq!(queue.queue_length(), 3);
    assert_eq!(queue.status_of(&QuestionId::new("d")), None);

    settle(&queue).await;
    assert!(queue.enqueue("d", json!("d"), Map::new()));
    settle(&queue).await;
    assert_eq!(queue.status_of(&QuestionId::new("d")), Some(Success));
}

#[tokio::test]
async fn failing_entry_is_retried_exactly_max_retries_times() {
    let mut backend = MockBackend::new();
    backend.expect_submit().times(4).returning(|_| Err(backend_error()));
    let queue = SubmissionQueue::new(fast_config(3), backend).unwrap();

    assert!(queue.enqueue("q1", json!("x"), Map::new()));
    settle(&queue).await;

    assert_eq!(
        status_trail(&queue, "q1"),
        vec![
            Pending, Processing, Retrying, Processing, Retrying, Processing, Retrying,
            Processing, Error
        ]
    );
    assert_eq!(queue.status_of(&QuestionId::new("q1")), Some(Error));
    assert_eq!(queue.queue_length(), 0);
    assert!(queue.entries().is_empty());
}

#[tokio::test]
async fn successful_submissions_drain_the_queue() {
    let mut backend = MockBackend::new();
    backend.expect_submit().times(10).returning(|_| Ok(()));
    let queue = SubmissionQueue::new(fast_config(3), backend).unwrap();

    for i in 0..10 {
        assert!(queue.enqueue(format!("q{}", i), json!(i), Map::new()));
    }
    settle(&queue).await;

    assert_eq!(queue.queue_length(), 0);
    assert!(!queue.is_processing());
    let statuses = queue.statuses();
    assert_eq!(statuses.len(), 10);
    assert!(statuses.values().all(|s| *s == Success));
}

#[tokio::test]
async fn retried_entry_goes_before_newer_answers() {
    let mut config = fast_config(3);
    config.retry_delay_ms = 100;
    let submitter = ScriptedSubmitter::new().failing("a", 1);
    let calls = submitter.calls();
    let queue = SubmissionQueue::new(config, submitter).unwrap();

    assert!(queue.enqueue("a", json!(1), Map::new()));
    wait_for_status(&queue, "a", Retrying).await;

    assert!(queue.enqueue("b", json!(2), Map::new()));
    let order: Vec<_> = queue
        .entries()
        .iter()
        .map(|e| e.question_id.as_str().to_string())
        .collect();
    assert_eq!(order, vec!["a", "b"]);
    assert_eq!(queue.entries()[0].retry_count, 1);

    settle(&queue).await;

    assert_eq!(called_ids(&calls), vec!["a", "a", "b"]);
    assert_eq!(queue.status_of(&QuestionId::new("a")), Some(Success));
    assert_eq!(queue.status_of(&QuestionId::new("b")), Some(Success));
}

#[tokio::test]
async fn retrying_answer_is_replaced_by_a_fresh_one() {
    let mut config = fast_config(3);
    config.retry_delay_ms = 100;
    let submitter = ScriptedSubmitter::new().failing("a", 1);
    let calls = submitter.calls();
    let queue = SubmissionQueue::new(config, submitter).unwrap();

    assert!(queue.enqueue("a", json!("old"), Map::new()));
    assert!(queue.enqueue("b", json!("b"), Map::new()));
    wait_for_status(&queue, "a", Retrying).await;

    let outcome = queue.try_enqueue("a", json!("new"), Map::new());
    assert!(matches!(outcome, EnqueueOutcome::Replaced { .. }));
    let entries = queue.entries();
    assert_eq!(entries[1].question_id, QuestionId::new("a"));
    assert_eq!(entries[1].retry_count, 0);

    settle(&queue).await;

    let calls = calls.lock().unwrap();
    let answers: Vec<_> = calls.iter().map(|p| p.answer.clone()).collect();
    assert_eq!(answers, vec![json!("old"), json!("b"), json!("new")]);
}

#[tokio::test]
async fn binary_answer_is_sent_as_si() {
    let mut backend = MockBackend::new();
    backend
        .expect_submit()
        .withf(|p: &SubmissionPayload| {
            p.question_id.as_str() == "Q1"
                && p.answer == json!("Sí")
                && p.metadata["user_id"] == json!(17)
        })
        .times(1)
        .returning(|_| Ok(()));
    let queue = SubmissionQueue::new(fast_config(3), backend).unwrap();

    assert!(queue.enqueue("Q1", json!(true), metadata("binaria")));
    settle(&queue).await;

    assert_eq!(queue.status_of(&QuestionId::new("Q1")), Some(Success));
}

#[tokio::test]
async fn two_retries_then_permanent_error() {
    let mut backend = MockBackend::new();
    backend.expect_submit().times(3).returning(|_| Err(backend_error()));
    let queue = SubmissionQueue::new(fast_config(2), backend).unwrap();

    assert!(queue.enqueue("Q2", json!("12.5"), metadata("numerica")));
    settle(&queue).await;

    assert_eq!(queue.status_of(&QuestionId::new("Q2")), Some(Error));
    assert_eq!(queue.queue_length(), 0);

    let stats = queue.stats();
    assert_eq!(stats.total_retries, 2);
    assert_eq!(stats.total_errors, 1);
    assert_eq!(stats.total_processed, 0);
}

#[tokio::test]
async fn errored_question_can_be_resubmitted() {
    let submitter = ScriptedSubmitter::new().failing("q1", 1);
    let calls = submitter.calls();
    let queue = SubmissionQueue::new(fast_config(0), submitter).unwrap();

    assert!(queue.enqueue("q1", json!(1), Map::new()));
    settle(&queue).await;
    assert_eq!(queue.status_of(&QuestionId::new("q1")), Some(Error));

    assert!(queue.enqueue("q1", json!(1), Map::new()));
    assert_eq!(queue.entries()[0].retry_count, 0);
    settle(&queue).await;

    assert_eq!(queue.status_of(&QuestionId::new("q1")), Some(Success));
    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn only_one_submission_is_in_flight() {
    let (submitter, gate) = GatedSubmitter::new();
    let calls = submitter.calls();
    let queue = SubmissionQueue::new(fast_config(3), submitter).unwrap();

    for q in ["a", "b", "c"] {
        assert!(queue.enqueue(q, json!(q), Map::new()));
    }
    wait_for_status(&queue, "a", Processing).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(queue.status_of(&QuestionId::new("b")), Some(Pending));

    gate.add_permits(3);
    settle(&queue).await;
    assert_eq!(called_ids(&calls), vec!["a", "b", "c"]);
}

async fn time_one_retry(mode: RetryDelayMode) -> Duration {
    let mut config = fast_config(3);
    config.inter_item_delay_ms = 10;
    config.retry_delay_ms = 2_000;
    config.retry_delay_mode = mode;
    let submitter = ScriptedSubmitter::new().failing("a", 1);
    let calls = submitter.calls();
    let queue = SubmissionQueue::new(config, submitter).unwrap();

    let started = Instant::now();
    assert!(queue.enqueue("a", json!(1), Map::new()));
    settle(&queue).await;

    assert_eq!(called_ids(&calls), vec!["a", "a"]);
    assert_eq!(queue.status_of(&QuestionId::new("a")), Some(Success));
    started.elapsed()
}

#[tokio::test(start_paused = true)]
async fn distinct_mode_waits_retry_delay() {
    let elapsed = time_one_retry(RetryDelayMode::Distinct).await;
    assert!(elapsed >= Duration::from_millis(2_000), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2_010), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn inter_item_mode_retries_after_inter_item_delay() {
    let elapsed = time_one_retry(RetryDelayMode::InterItem).await;
    assert!(elapsed >= Duration::from_millis(10), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2_000), "{:?}", elapsed);
}
