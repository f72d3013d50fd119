use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adjutant::{
    DeliveryBatch, DeliveryHandle, HandlerError, HandlerRegistry, JobContext, JobEngine,
    JobFilter, JobHandler, JobOutcome, JobRef, JobSort, JobStatus, JobStore, JobUpdate,
    MemoryJobStore, MemoryTransport, Page, QueueConfig,
};
use async_trait::async_trait;
use bytes::Bytes;

struct Echo {
    performed: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl JobHandler for Echo {
    const NAME: &'static str = "echo";
    type Payload = String;
    type Output = String;

    async fn perform(&self, _ctx: JobContext, payload: String) -> Result<String, HandlerError> {
        self.performed.lock().unwrap().push(payload.clone());
        Ok(payload.to_uppercase())
    }
}

struct AlwaysFails {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl JobHandler for AlwaysFails {
    const NAME: &'static str = "always_fails";
    type Payload = String;
    type Output = String;

    async fn perform(&self, _ctx: JobContext, _payload: String) -> Result<String, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::failed("synthetic failure"))
    }
}

struct Sleepy;

#[async_trait]
impl JobHandler for Sleepy {
    const NAME: &'static str = "sleepy";
    type Payload = String;
    type Output = String;

    async fn perform(&self, _ctx: JobContext, _payload: String) -> Result<String, HandlerError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("done".to_string())
    }
}

fn engine_with(
    registry: HandlerRegistry,
    config: QueueConfig,
) -> (Arc<MemoryJobStore>, Arc<MemoryTransport>, JobEngine) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let store = Arc::new(MemoryJobStore::new());
    let transport = Arc::new(MemoryTransport::new());
    let engine =
        JobEngine::new(store.clone(), transport.clone(), Arc::new(registry)).with_config(config);
    (store, transport, engine)
}

fn encode(payload: &str) -> Bytes {
    bincode::encode_to_vec(payload.to_string(), bincode::config::standard())
        .unwrap()
        .into()
}

fn decode_string(bytes: &Bytes) -> String {
    let (decoded, _) = bincode::decode_from_slice(bytes, bincode::config::standard()).unwrap();
    decoded
}

#[tokio::test]
async fn enqueue_creates_a_pending_row_and_round_trips_the_payload() {
    let mut registry = HandlerRegistry::new();
    registry.register(Echo {
        performed: Arc::new(Mutex::new(Vec::new())),
    });
    let (store, _transport, engine) = engine_with(registry, QueueConfig::default());

    let id = engine.enqueue::<Echo>("hello".to_string()).await.unwrap();

    let job = store.get(id).await.unwrap().expect("row exists");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.binding, "echo");
    assert_eq!(decode_string(&job.payload), "hello");
    assert!(job.started_at.is_none());

    let (rows, total) = engine
        .list(
            &JobFilter::new().binding("echo"),
            JobSort::default(),
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].id, id);
}

#[tokio::test]
async fn empty_binding_names_are_rejected() {
    let (_store, _transport, engine) = engine_with(HandlerRegistry::new(), QueueConfig::default());

    let err = engine
        .enqueue_raw("", encode("payload"))
        .await
        .expect_err("empty binding");
    assert!(matches!(err, adjutant::EnqueueError::EmptyBinding));
}

#[tokio::test]
async fn successful_delivery_completes_the_job() {
    let performed = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    registry.register(Echo {
        performed: performed.clone(),
    });
    let (store, transport, engine) = engine_with(registry, QueueConfig::default());

    let id = engine.enqueue::<Echo>("hello".to_string()).await.unwrap();

    let batch = transport.recv_batch(10).await.unwrap();
    engine.dispatch(batch).await.unwrap();

    let job = store.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 0);
    assert!(job.started_at.is_some());
    assert!(job.finished_at.is_some());
    assert_eq!(job.completed_at, job.finished_at);
    assert!(job.processing_time.unwrap() >= chrono::Duration::zero());

    match job.result {
        Some(JobOutcome::Output(ref bytes)) => assert_eq!(decode_string(bytes), "HELLO"),
        other => panic!("expected output result, got {other:?}"),
    }

    assert_eq!(performed.lock().unwrap().as_slice(), ["hello".to_string()]);
    assert!(transport.try_recv_batch(10).is_none(), "no redelivery");
}

#[tokio::test]
async fn failing_deliveries_retry_until_the_budget_is_exhausted() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = HandlerRegistry::new();
    registry.register(AlwaysFails {
        calls: calls.clone(),
    });
    let (store, transport, engine) = engine_with(registry, QueueConfig::default());

    let id = engine
        .enqueue::<AlwaysFails>("doomed".to_string())
        .await
        .unwrap();

    // max_attempts = 3: deliveries carrying 0, 1 and 2 prior attempts end in
    // RetryPending, the one carrying 3 fails terminally.
    for delivered_attempts in 0..=3u32 {
        let batch = transport.recv_batch(10).await.unwrap();
        engine.dispatch(batch).await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.attempts, delivered_attempts);
        if delivered_attempts < 3 {
            assert_eq!(job.status, JobStatus::RetryPending);
        } else {
            assert_eq!(job.status, JobStatus::Failed);
        }
        match job.result {
            Some(JobOutcome::Error(ref msg)) => assert!(msg.contains("synthetic failure")),
            other => panic!("expected error result, got {other:?}"),
        }
    }

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(transport.try_recv_batch(10).is_none(), "budget exhausted");
}

#[tokio::test]
async fn mixed_batch_settles_every_delivery_independently() {
    let performed = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = HandlerRegistry::new();
    registry.register(Echo {
        performed: performed.clone(),
    });
    registry.register(AlwaysFails {
        calls: calls.clone(),
    });
    let (store, transport, engine) = engine_with(registry, QueueConfig::default());

    // A: fresh success. B: failure one delivery into its budget. C: failure
    // with the budget already spent.
    let a = engine.enqueue::<Echo>("a".to_string()).await.unwrap();
    let b = store.create("always_fails", encode("b")).await.unwrap();
    transport
        .send_with_attempts(JobRef::from(&b), 1)
        .unwrap();
    let c = store.create("always_fails", encode("c")).await.unwrap();
    transport
        .send_with_attempts(JobRef::from(&c), 3)
        .unwrap();

    let batch = transport.recv_batch(10).await.unwrap();
    engine.dispatch(batch).await.unwrap();

    assert_eq!(
        store.get(a).await.unwrap().unwrap().status,
        JobStatus::Completed
    );
    let b = store.get(b.id).await.unwrap().unwrap();
    assert_eq!(b.status, JobStatus::RetryPending);
    assert_eq!(b.attempts, 1);
    let c = store.get(c.id).await.unwrap().unwrap();
    assert_eq!(c.status, JobStatus::Failed);
    assert_eq!(c.attempts, 3);

    // Only B asked for redelivery, and its next delivery carries one more
    // prior attempt.
    let mut redeliveries = transport.try_recv_batch(10).expect("B is redelivered");
    let deliveries = redeliveries.drain();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].job_ref().id, b.id);
    assert_eq!(deliveries[0].attempts(), 2);
}

#[tokio::test]
async fn unknown_bindings_are_retried_like_handler_failures() {
    let (store, transport, engine) = engine_with(HandlerRegistry::new(), QueueConfig::default());

    let id = engine.enqueue_raw("nowhere", encode("x")).await.unwrap();

    let batch = transport.recv_batch(10).await.unwrap();
    engine.dispatch(batch).await.unwrap();

    let job = store.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::RetryPending);
    match job.result {
        Some(JobOutcome::Error(ref msg)) => assert!(msg.contains("no handler registered")),
        other => panic!("expected error result, got {other:?}"),
    }
    assert!(transport.try_recv_batch(10).is_some(), "redelivery queued");
}

#[tokio::test]
async fn cancelled_jobs_are_never_reprocessed() {
    let performed = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    registry.register(Echo {
        performed: performed.clone(),
    });
    let (store, transport, engine) = engine_with(registry, QueueConfig::default());

    let id = engine.enqueue::<Echo>("stop me".to_string()).await.unwrap();

    // Cancellation happens outside the dispatch loop, racing the delivery.
    store
        .update(id, JobUpdate::new().status(JobStatus::Cancelled))
        .await
        .unwrap();

    let batch = transport.recv_batch(10).await.unwrap();
    engine.dispatch(batch).await.unwrap();

    let job = store.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.started_at.is_none());
    assert!(performed.lock().unwrap().is_empty(), "handler never ran");
    assert!(transport.try_recv_batch(10).is_none(), "no redelivery");
}

#[tokio::test]
async fn sweep_reclaims_only_terminal_jobs_past_retention() {
    let performed = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    registry.register(Echo {
        performed: performed.clone(),
    });
    // Zero retention: anything terminal is immediately past the window.
    let config = QueueConfig::new().retention(chrono::Duration::zero());
    let (store, transport, engine) = engine_with(registry, config);

    let completed = engine.enqueue::<Echo>("done".to_string()).await.unwrap();
    let batch = transport.recv_batch(10).await.unwrap();
    engine.dispatch(batch).await.unwrap();

    let pending = engine.enqueue::<Echo>("later".to_string()).await.unwrap();

    let removed = engine.sweep().await.unwrap();
    assert_eq!(removed, 1);
    assert!(store.get(completed).await.unwrap().is_none());
    assert!(store.get(pending).await.unwrap().is_some());

    // Running it again with no new data is a no-op.
    assert_eq!(engine.sweep().await.unwrap(), 0);
}

#[tokio::test]
async fn fresh_terminal_jobs_survive_the_default_retention() {
    let performed = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    registry.register(Echo {
        performed: performed.clone(),
    });
    let (store, transport, engine) = engine_with(registry, QueueConfig::default());

    let id = engine.enqueue::<Echo>("fresh".to_string()).await.unwrap();
    let batch = transport.recv_batch(10).await.unwrap();
    engine.dispatch(batch).await.unwrap();

    assert_eq!(engine.sweep().await.unwrap(), 0);
    assert!(store.get(id).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn hung_handlers_are_cut_off_by_the_configured_timeout() {
    let mut registry = HandlerRegistry::new();
    registry.register(Sleepy);
    let config = QueueConfig::new().handler_timeout(Duration::from_secs(5));
    let (store, transport, engine) = engine_with(registry, config);

    let id = engine.enqueue::<Sleepy>("zzz".to_string()).await.unwrap();

    let batch = transport.recv_batch(10).await.unwrap();
    engine.dispatch(batch).await.unwrap();

    let job = store.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::RetryPending, "timeout is retryable");
    match job.result {
        Some(JobOutcome::Error(ref msg)) => assert!(msg.contains("timed out")),
        other => panic!("expected error result, got {other:?}"),
    }
}
