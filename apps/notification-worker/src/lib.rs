//! Notification Worker Service
//!
//! A background worker that processes notification requests from a Redis
//! stream.
//!
//! ## Architecture
//!
//! ```text
//! Redis Stream (notifications:dispatch)
//!   ↓ (Consumer Group: notification_workers)
//! StreamWorker<NotificationRequest, NotificationProcessor>
//!   ↓ (resolves recipient preferences)
//! Notification + DeliveryAttempt rows (PostgreSQL)
//!   ↓ (when SMS applies)
//! Africa's Talking gateway
//! ```
//!
//! ## Features
//!
//! - Consumer group support for horizontal scaling
//! - Visibility-timeout redelivery of abandoned messages
//! - Dead letter queue after the delivery limit
//! - Graceful shutdown handling
//!
//! ## Configuration
//!
//! | Variable | Default | |
//! |---|---|---|
//! | `QUEUE_URL` | `redis://127.0.0.1:6379` | Redis connection URL |
//! | `DATABASE_URL` | unset | PostgreSQL URL; in-memory storage when unset |
//! | `WORKER_CONCURRENCY` | `4` | Jobs processed in parallel |
//! | `WORKER_VISIBILITY_TIMEOUT_SECONDS` | `30` | Redelivery timeout |
//! | `WORKER_MAX_ATTEMPTS` | `5` | Deliveries before dead-lettering |
//! | `SMS_PROVIDER_USERNAME` / `SMS_PROVIDER_API_KEY` | unset | SMS disabled when absent |

use domain_notifications::{
    GatewaySmsClient, InMemoryNotificationStore, InMemoryPreferences, NotificationProcessor,
    NotificationRequest, NotificationStore, NotificationStream, PostgresNotificationStore,
    PostgresPreferences, PreferencesReader,
};
use eyre::{Result, WrapErr};
use redis::aio::ConnectionManager;
use std::str::FromStr;
use std::sync::Arc;
use stream_worker::{StreamWorker, WorkerConfig};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const DEFAULT_QUEUE_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_VISIBILITY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Read an env var, falling back to the default when unset or unparseable.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Run the notification worker.
///
/// This is the main entry point for the worker. It:
/// 1. Sets up structured logging via `RUST_LOG`
/// 2. Connects to Redis for stream processing
/// 3. Connects to PostgreSQL when `DATABASE_URL` is set
/// 4. Starts the worker with graceful shutdown handling
pub async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting notification worker service");

    let queue_url =
        std::env::var("QUEUE_URL").unwrap_or_else(|_| DEFAULT_QUEUE_URL.to_string());
    info!(queue_url = %queue_url, "Connecting to Redis...");
    let client = redis::Client::open(queue_url).wrap_err("Invalid QUEUE_URL")?;
    let redis = ConnectionManager::new(client)
        .await
        .wrap_err("Failed to connect to Redis")?;
    info!("Connected to Redis successfully");

    let (store, preferences): (Arc<dyn NotificationStore>, Arc<dyn PreferencesReader>) =
        match std::env::var("DATABASE_URL") {
            Ok(database_url) => {
                info!("Connecting to PostgreSQL...");
                let db = sea_orm::Database::connect(&database_url)
                    .await
                    .wrap_err("Failed to connect to PostgreSQL")?;
                info!("Connected to PostgreSQL successfully");
                (
                    Arc::new(PostgresNotificationStore::new(db.clone())),
                    Arc::new(PostgresPreferences::new(db)),
                )
            }
            Err(_) => {
                warn!("DATABASE_URL not set, using in-memory storage");
                (
                    Arc::new(InMemoryNotificationStore::new()),
                    Arc::new(InMemoryPreferences::new()),
                )
            }
        };

    let sms = Arc::new(GatewaySmsClient::from_env());

    let worker_config = WorkerConfig::from_stream_def::<NotificationStream>()
        .with_blocking(Some(1000))
        .with_max_concurrent_jobs(env_or("WORKER_CONCURRENCY", DEFAULT_CONCURRENCY))
        .with_visibility_timeout_ms(
            env_or(
                "WORKER_VISIBILITY_TIMEOUT_SECONDS",
                DEFAULT_VISIBILITY_TIMEOUT_SECS,
            ) * 1000,
        )
        .with_max_attempts(env_or("WORKER_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS));
    info!(
        stream = %worker_config.stream_name,
        consumer_group = %worker_config.consumer_group,
        consumer_id = %worker_config.consumer_id,
        max_concurrent_jobs = %worker_config.max_concurrent_jobs,
        visibility_timeout_ms = %worker_config.visibility_timeout_ms,
        max_attempts = %worker_config.max_attempts,
        "Worker configuration loaded"
    );

    let processor = NotificationProcessor::new(store, preferences, sms);
    info!("Notification processor initialized");

    // Set up a shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    info!("Starting notification request processor...");
    let worker = StreamWorker::<NotificationRequest, _>::new(redis, processor, worker_config);
    worker
        .run(shutdown_rx)
        .await
        .map_err(|e| eyre::eyre!("{}", e))?;

    info!("Notification worker service stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
