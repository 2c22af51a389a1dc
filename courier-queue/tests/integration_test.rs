//! End-to-end queue behavior on the in-memory store.

use courier_queue::events::names;
use courier_queue::prelude::*;
use courier_queue::{DEAD_LETTER_KEY, Dispatcher, JobOutcome, RecordingEventSink};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Harness {
    store: Arc<MemoryStore>,
    events: Arc<RecordingEventSink>,
    registry: Arc<ProcessorRegistry>,
    queue: QueueService,
}

fn harness(registry: ProcessorRegistry) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let events = Arc::new(RecordingEventSink::new());
    let registry = Arc::new(registry);
    let queue = QueueService::new(store.clone(), events.clone()).with_registry(registry.clone());
    Harness {
        store,
        events,
        registry,
        queue,
    }
}

fn otp_payload() -> serde_json::Value {
    json!({"type": "OTP_VERIFICATION", "to": "a@b.com", "otpCode": "123456"})
}

#[tokio::test(start_paused = true)]
async fn test_email_job_succeeds_through_pool() {
    let mut registry = ProcessorRegistry::new();
    registry
        .register(EmailJobProcessor::new(Arc::new(LogEmailSender)))
        .unwrap();
    let h = harness(registry);

    let job_id = h.queue.enqueue("email", "EMAIL", &otp_payload()).await.unwrap();

    let mut pool = WorkerPool::new(
        h.store.clone(),
        h.registry.clone(),
        h.events.clone(),
        WorkerConfig::default(),
    );
    pool.start().unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    pool.shutdown().await.unwrap();

    let processed = h.events.business(names::JOB_PROCESSED, names::SUCCESS);
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0]["jobId"], job_id.to_string());
    assert_eq!(processed[0]["queueName"], "email");
    assert!(h.events.business(names::JOB_DEAD_LETTER, names::FAILED).is_empty());
    assert_eq!(h.store.len(DEAD_LETTER_KEY).await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_always_failing_job_retries_three_times_then_dead_letters() {
    let mut registry = ProcessorRegistry::new();
    registry
        .register(FnProcessor::new("EMAIL", |_| async {
            Err(ProcessError::new("smtp unavailable"))
        }))
        .unwrap();
    let h = harness(registry);
    let dispatcher = Dispatcher::new(h.store.clone(), h.registry.clone(), h.events.clone());

    let job_id = h.queue.enqueue("email", "EMAIL", &otp_payload()).await.unwrap();

    let mut delays = Vec::new();
    let dead_reason = loop {
        match dispatcher.poll_once("email").await.unwrap() {
            JobOutcome::RetryScheduled { delay, .. } => {
                // not visible a moment before the backoff ends
                tokio::time::advance(delay - Duration::from_millis(1)).await;
                assert_eq!(dispatcher.poll_once("email").await.unwrap(), JobOutcome::Idle);
                tokio::time::advance(Duration::from_millis(1)).await;
                delays.push(delay);
            }
            JobOutcome::DeadLettered { job_id: dead, reason } => {
                assert_eq!(dead, job_id);
                break reason;
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    };

    assert_eq!(
        delays,
        vec![
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8)
        ]
    );
    assert_eq!(dead_reason, "smtp unavailable");

    let retries = h.events.business(names::JOB_RETRY_SCHEDULED, names::RETRY);
    let retry_delays: Vec<u64> = retries
        .iter()
        .filter_map(|ctx| ctx["delaySeconds"].as_u64())
        .collect();
    assert_eq!(retry_delays, vec![2, 4, 8]);
    assert_eq!(h.events.business(names::JOB_DEAD_LETTER, names::FAILED).len(), 1);

    // terminal: nothing comes back to the origin queue
    tokio::time::advance(Duration::from_secs(3600)).await;
    assert_eq!(dispatcher.poll_once("email").await.unwrap(), JobOutcome::Idle);

    let dead = dispatcher.dead_letter().inspect().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, job_id);
    assert_eq!(dead[0].error_message.as_deref(), Some("smtp unavailable"));
}

#[tokio::test(start_paused = true)]
async fn test_undelayed_jobs_run_in_insertion_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let seen = order.clone();
    let mut registry = ProcessorRegistry::new();
    registry
        .register(FnProcessor::new("step", move |payload: Payload| {
            let seen = seen.clone();
            async move {
                let n = payload.get("n").and_then(|v| v.as_u64()).unwrap_or_default();
                seen.lock().unwrap().push(n);
                Ok(())
            }
        }))
        .unwrap();
    let h = harness(registry);

    for n in 0..10u64 {
        h.queue.enqueue("default", "step", &json!({"n": n})).await.unwrap();
    }

    let mut pool = WorkerPool::new(
        h.store.clone(),
        h.registry.clone(),
        h.events.clone(),
        WorkerConfig::default().with_queues(["default"]),
    );
    pool.start().unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    pool.shutdown().await.unwrap();

    assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_unknown_job_type_dead_letters_on_first_pop() {
    let h = harness(ProcessorRegistry::new());
    let dispatcher = Dispatcher::new(h.store.clone(), h.registry.clone(), h.events.clone());

    let job_id = h
        .queue
        .enqueue("notifications", "PUSH", &json!({"deviceId": "abc"}))
        .await
        .unwrap();

    let outcome = dispatcher.poll_once("notifications").await.unwrap();
    assert_eq!(
        outcome,
        JobOutcome::DeadLettered {
            job_id,
            reason: "No processor found".to_string()
        }
    );

    let dead = dispatcher.dead_letter().inspect().await.unwrap();
    assert_eq!(dead[0].retry_count, 0);
    assert_eq!(dispatcher.poll_once("notifications").await.unwrap(), JobOutcome::Idle);
    assert!(h.events.business(names::JOB_RETRY_SCHEDULED, names::RETRY).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_job_runs_after_delay() {
    let mut registry = ProcessorRegistry::new();
    registry
        .register(FnProcessor::new("reminder", |_| async { Ok(()) }))
        .unwrap();
    let h = harness(registry);
    let dispatcher = Dispatcher::new(h.store.clone(), h.registry.clone(), h.events.clone());

    h.queue
        .schedule_job("reminder", &json!({"message": "hi"}), Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(dispatcher.poll_once("default").await.unwrap(), JobOutcome::Idle);
    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(matches!(
        dispatcher.poll_once("default").await.unwrap(),
        JobOutcome::Succeeded { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_follows_processor() {
    let mut registry = ProcessorRegistry::new();
    registry
        .register(
            FnProcessor::new("fragile", |_| async { Err(ProcessError::new("nope")) })
                .with_max_retries(1),
        )
        .unwrap();
    let h = harness(registry);
    let dispatcher = Dispatcher::new(h.store.clone(), h.registry.clone(), h.events.clone());

    h.queue.enqueue("default", "fragile", &json!({})).await.unwrap();

    assert!(matches!(
        dispatcher.poll_once("default").await.unwrap(),
        JobOutcome::RetryScheduled { retry_count: 1, .. }
    ));
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(matches!(
        dispatcher.poll_once("default").await.unwrap(),
        JobOutcome::DeadLettered { .. }
    ));
}
