//! Integration tests against a real Redis container.
//!
//! Requires Docker; run with `cargo test -p stream-worker -- --ignored`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use stream_worker::{
    DlqManager, StreamConsumer, StreamError, StreamJob, StreamProcessor, StreamProducer,
    StreamWorker, WorkerConfig,
};
use test_utils::TestRedis;
use tokio::sync::watch;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CounterJob {
    id: String,
    value: u32,
}

impl StreamJob for CounterJob {
    fn job_id(&self) -> String {
        self.id.clone()
    }
}

fn config(stream: &str) -> WorkerConfig {
    WorkerConfig::new(stream, "test_group")
        .with_dlq_stream(format!("{}:dlq", stream))
        .with_blocking(Some(200))
        .with_poll_interval_ms(50)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn produce_consume_ack_roundtrip() {
    let redis = TestRedis::new().await;
    let conn = redis.connection_manager().await;

    let producer = StreamProducer::new(conn.clone(), "jobs:roundtrip");
    let job = CounterJob {
        id: "job-1".to_string(),
        value: 42,
    };
    producer.send(&job).await.unwrap();
    assert_eq!(producer.stream_length().await.unwrap(), 1);

    let consumer = StreamConsumer::new(Arc::new(conn), config("jobs:roundtrip"));
    consumer.ensure_consumer_group().await.unwrap();

    let events = consumer.read_new::<CounterJob>().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].job.value, 42);
    assert_eq!(events[0].delivery_count, 1);

    consumer.ack(&events[0].stream_id).await.unwrap();
    let info = consumer.stream_info().await.unwrap();
    assert_eq!(info.pending_count, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn poison_message_moves_to_dlq_without_wedging_the_group() {
    let redis = TestRedis::new().await;
    let conn = redis.connection_manager().await;

    // Append a payload that will never deserialize into CounterJob
    let mut raw = conn.clone();
    let _: String = redis::cmd("XADD")
        .arg("jobs:poison")
        .arg("*")
        .arg("job")
        .arg("{not valid json")
        .query_async(&mut raw)
        .await
        .unwrap();

    let consumer = StreamConsumer::new(Arc::new(conn.clone()), config("jobs:poison"));
    consumer.ensure_consumer_group().await.unwrap();

    let events = consumer.read_new::<CounterJob>().await.unwrap();
    assert!(events.is_empty());

    // The poison entry was acked and sits in the DLQ
    let info = consumer.stream_info().await.unwrap();
    assert_eq!(info.pending_count, 0);

    let dlq = DlqManager::new(Arc::new(conn), "jobs:poison:dlq");
    let stats = dlq.stats().await.unwrap();
    assert_eq!(stats.length, 1);
}

struct AlwaysTransient {
    attempts: Arc<AtomicU32>,
}

#[async_trait::async_trait]
impl StreamProcessor<CounterJob> for AlwaysTransient {
    async fn process(&self, _job: &CounterJob) -> Result<(), StreamError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StreamError::transient("backend down"))
    }

    fn name(&self) -> &'static str {
        "AlwaysTransient"
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn transient_failures_redeliver_then_dead_letter() {
    let redis = TestRedis::new().await;
    let conn = redis.connection_manager().await;

    let config = config("jobs:failing")
        .with_visibility_timeout_ms(200)
        .with_max_attempts(3);

    let producer = StreamProducer::new(conn.clone(), "jobs:failing");
    producer
        .send(&CounterJob {
            id: "doomed".to_string(),
            value: 0,
        })
        .await
        .unwrap();

    let attempts = Arc::new(AtomicU32::new(0));
    let processor = AlwaysTransient {
        attempts: attempts.clone(),
    };
    let worker = StreamWorker::new(conn.clone(), processor, config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    // Wait until the job lands in the DLQ
    let dlq = DlqManager::new(Arc::new(conn), "jobs:failing:dlq");
    let mut dead_lettered = false;
    for _ in 0..100 {
        if dlq.stats().await.unwrap().length > 0 {
            dead_lettered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert!(dead_lettered, "job never reached the DLQ");
    assert!(attempts.load(Ordering::SeqCst) >= 3);

    let entries = dlq.list(10, None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].job_id, "doomed");
}
