//! Core worker traits and the generic StreamWorker implementation.
//!
//! This module provides:
//! - `StreamProcessor` trait for job processors
//! - `StreamWorker` struct for running the worker loop

use crate::config::WorkerConfig;
use crate::consumer::StreamConsumer;
use crate::dlq::DlqManager;
use crate::error::{ErrorCategory, StreamError};
use crate::event::StreamEvent;
use crate::registry::StreamJob;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Trait for job processors.
///
/// Domain handlers implement this trait to process jobs from the stream.
///
/// # Type Parameters
///
/// * `J` - The job type that this processor handles
///
/// # Example
///
/// ```rust,ignore
/// use stream_worker::{StreamProcessor, StreamError};
///
/// struct DispatchProcessor {
///     store: Arc<dyn NotificationStore>,
/// }
///
/// #[async_trait]
/// impl StreamProcessor<NotificationRequest> for DispatchProcessor {
///     async fn process(&self, job: &NotificationRequest) -> Result<(), StreamError> {
///         self.store.persist(job).await?;
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "DispatchProcessor"
///     }
/// }
/// ```
#[async_trait]
pub trait StreamProcessor<J: StreamJob>: Send + Sync {
    /// Process a single job.
    ///
    /// Return `Ok(())` for success, `Err` for failure. A transient error
    /// leaves the message pending for redelivery; a permanent error moves
    /// it straight to the DLQ.
    async fn process(&self, job: &J) -> Result<(), StreamError>;

    /// Get the processor name for logging.
    fn name(&self) -> &'static str;

    /// Health check for the processor.
    ///
    /// Override this to add custom health checks (e.g., checking external services).
    /// Default: always returns Ok(true).
    async fn health_check(&self) -> Result<bool, StreamError> {
        Ok(true)
    }
}

/// Generic stream worker that processes jobs using a processor.
///
/// This struct encapsulates the worker loop with:
/// - Consumer group management
/// - Visibility-timeout recovery of abandoned messages
/// - Delivery-limit enforcement with a dead letter queue
/// - Graceful shutdown
/// - Concurrent job processing (configurable via `max_concurrent_jobs`)
///
/// # At-least-once semantics
///
/// A message is acknowledged only after the processor returns `Ok` (or the
/// message is dead-lettered). A transiently failing message stays in the
/// pending entries list and is reclaimed after `visibility_timeout_ms`;
/// once `XPENDING` reports more than `max_attempts` deliveries it moves to
/// the DLQ instead.
pub struct StreamWorker<J, P>
where
    J: StreamJob,
    P: StreamProcessor<J>,
{
    consumer: Arc<StreamConsumer>,
    dlq: Arc<DlqManager>,
    processor: Arc<P>,
    config: WorkerConfig,
    /// Semaphore to limit concurrent job processing
    concurrency_semaphore: Arc<Semaphore>,
    _phantom: PhantomData<J>,
}

impl<J, P> StreamWorker<J, P>
where
    J: StreamJob + 'static,
    P: StreamProcessor<J> + 'static,
{
    /// Create a new stream worker.
    pub fn new(redis: ConnectionManager, processor: P, config: WorkerConfig) -> Self {
        Self::with_arc_processor(redis, Arc::new(processor), config)
    }

    /// Create a new stream worker with an Arc processor.
    pub fn with_arc_processor(
        redis: ConnectionManager,
        processor: Arc<P>,
        config: WorkerConfig,
    ) -> Self {
        let redis = Arc::new(redis);
        let consumer = Arc::new(StreamConsumer::new(redis.clone(), config.clone()));
        let dlq = Arc::new(DlqManager::new(redis, config.dlq_stream.clone()));
        let concurrency_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));

        Self {
            consumer,
            dlq,
            processor,
            concurrency_semaphore,
            config,
            _phantom: PhantomData,
        }
    }

    /// Get a reference to the consumer for health checks.
    pub fn consumer(&self) -> &StreamConsumer {
        &self.consumer
    }

    /// Run the worker loop.
    ///
    /// This continuously reads jobs from the stream and processes them.
    /// Use the shutdown receiver to gracefully stop the worker.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), StreamError> {
        info!(
            consumer_id = %self.config.consumer_id,
            stream = %self.config.stream_name,
            group = %self.config.consumer_group,
            processor = %self.processor.name(),
            max_concurrent_jobs = %self.config.max_concurrent_jobs,
            batch_size = %self.config.batch_size,
            visibility_timeout_ms = %self.config.visibility_timeout_ms,
            max_attempts = %self.config.max_attempts,
            "Starting stream worker"
        );

        // Ensure consumer group exists
        self.consumer.ensure_consumer_group().await?;

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let claim_interval = Duration::from_millis(self.config.visibility_timeout_ms);
        let mut last_claim = std::time::Instant::now();
        let is_blocking = self.config.blocking_timeout_ms.is_some();

        // Track consecutive errors for exponential backoff
        let mut consecutive_errors: u32 = 0;
        const MAX_BACKOFF_SECS: u64 = 30;

        loop {
            // Check for shutdown signal
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping worker");
                break;
            }

            // Process new messages
            match self.process_batch().await {
                Ok(_) => {
                    if consecutive_errors > 0 {
                        info!("Connection recovered after {} errors", consecutive_errors);
                        consecutive_errors = 0;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;

                    if e.is_nogroup_error() {
                        warn!("Consumer group missing, recreating...");
                        if let Err(create_err) = self.consumer.ensure_consumer_group().await {
                            error!(error = %create_err, "Failed to recreate consumer group");
                        }
                    } else if e.is_connection_error() {
                        let backoff_secs =
                            std::cmp::min(2u64.pow(consecutive_errors.min(5)), MAX_BACKOFF_SECS);
                        warn!(
                            error = %e,
                            consecutive_errors = %consecutive_errors,
                            backoff_secs = %backoff_secs,
                            "Redis connection error, backing off"
                        );
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    } else {
                        error!(error = %e, "Error processing batch");
                    }

                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            }

            // Periodically claim abandoned messages past the visibility timeout
            if last_claim.elapsed() >= claim_interval {
                match self.consumer.claim_abandoned::<J>().await {
                    Ok(claimed) => self.process_events(claimed).await,
                    Err(e) => debug!(error = %e, "Error claiming abandoned messages"),
                }
                last_claim = std::time::Instant::now();
            }

            // In blocking mode, Redis BLOCK handles waiting, so skip sleep
            // In polling mode, wait before next poll
            if !is_blocking {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("Received shutdown signal, stopping worker");
                            break;
                        }
                    }
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }

        info!("Stream worker stopped");
        Ok(())
    }

    /// Read and process one batch of new messages.
    async fn process_batch(&self) -> Result<(), StreamError> {
        let events = self.consumer.read_new::<J>().await?;
        self.process_events(events).await;
        Ok(())
    }

    /// Process events based on the concurrency setting.
    async fn process_events(&self, events: Vec<StreamEvent<J>>) {
        if events.is_empty() {
            return;
        }

        if self.config.max_concurrent_jobs == 1 {
            for event in events {
                Self::process_event(
                    &self.processor,
                    &self.consumer,
                    &self.dlq,
                    &self.config,
                    event,
                )
                .await;
            }
        } else {
            self.process_events_concurrent(events).await;
        }
    }

    /// Process events concurrently using a semaphore to limit parallelism.
    async fn process_events_concurrent(&self, events: Vec<StreamEvent<J>>) {
        let mut join_set: JoinSet<()> = JoinSet::new();

        for event in events {
            let semaphore = Arc::clone(&self.concurrency_semaphore);
            let processor = Arc::clone(&self.processor);
            let consumer = Arc::clone(&self.consumer);
            let dlq = Arc::clone(&self.dlq);
            let config = self.config.clone();

            join_set.spawn(async move {
                // Acquire semaphore permit (blocks if at max concurrency)
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };

                Self::process_event(&processor, &consumer, &dlq, &config, event).await;
            });
        }

        // Wait for all jobs to complete
        while join_set.join_next().await.is_some() {}
    }

    /// Process a single event: ack on success, route failures.
    async fn process_event(
        processor: &Arc<P>,
        consumer: &Arc<StreamConsumer>,
        dlq: &Arc<DlqManager>,
        config: &WorkerConfig,
        event: StreamEvent<J>,
    ) {
        debug!(
            stream_id = %event.stream_id,
            job_id = %event.job_id(),
            delivery_count = %event.delivery_count,
            "Processing job"
        );

        match processor.process(&event.job).await {
            Ok(()) => {
                if let Err(e) = consumer.ack(&event.stream_id).await {
                    error!(stream_id = %event.stream_id, error = %e, "Failed to ACK message");
                }
            }
            Err(e) => {
                warn!(
                    stream_id = %event.stream_id,
                    job_id = %event.job_id(),
                    error = %e,
                    error_category = ?e.category(),
                    delivery_count = %event.delivery_count,
                    "Job processing failed"
                );

                Self::handle_failure(consumer, dlq, config, &event, e).await;
            }
        }
    }

    /// Route a failed event.
    ///
    /// - Permanent errors: dead-letter and ack immediately.
    /// - Transient errors within the delivery budget: leave the message
    ///   pending so the claim cycle redelivers it.
    /// - Transient errors past the delivery budget: dead-letter and ack.
    async fn handle_failure(
        consumer: &Arc<StreamConsumer>,
        dlq: &Arc<DlqManager>,
        config: &WorkerConfig,
        event: &StreamEvent<J>,
        error: StreamError,
    ) {
        let category = error.category();

        let exhausted = event.delivery_count >= config.max_attempts;
        if category == ErrorCategory::Transient && !exhausted {
            debug!(
                stream_id = %event.stream_id,
                job_id = %event.job_id(),
                delivery_count = %event.delivery_count,
                max_attempts = %config.max_attempts,
                "Leaving message pending for redelivery"
            );
            return;
        }

        if exhausted {
            warn!(
                job_id = %event.job_id(),
                delivery_count = %event.delivery_count,
                max_attempts = %config.max_attempts,
                "Job exceeded delivery limit, moving to DLQ"
            );
        } else {
            warn!(
                job_id = %event.job_id(),
                error_category = ?category,
                "Permanent error, moving to DLQ without retry"
            );
        }

        if let Err(dlq_err) = dlq
            .move_to_dlq(
                &event.job,
                &error.to_string(),
                &event.stream_id,
                event.delivery_count,
            )
            .await
        {
            error!(
                stream_id = %event.stream_id,
                error = %dlq_err,
                "Failed to move job to DLQ, leaving message pending"
            );
            return;
        }

        if let Err(ack_err) = consumer.ack(&event.stream_id).await {
            error!(stream_id = %event.stream_id, error = %ack_err, "Failed to ACK dead-lettered message");
        }
    }
}
