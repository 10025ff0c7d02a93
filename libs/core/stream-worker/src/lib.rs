//! Stream Worker Framework
//!
//! A generic Redis Streams worker framework for processing background jobs.
//!
//! ## Features
//!
//! - **Generic worker**: `StreamWorker<J, P>` processes any job type
//! - **Consumer groups**: Horizontal scaling with Redis consumer groups
//! - **Visibility timeout**: Un-acked messages are reclaimed and redelivered
//! - **Dead Letter Queue**: Jobs exceeding the delivery limit move to the DLQ
//!
//! ## Example
//!
//! ```ignore
//! use stream_worker::{StreamWorker, StreamJob, StreamProcessor, StreamDef, WorkerConfig};
//!
//! // Define your job type
//! #[derive(Clone, Serialize, Deserialize)]
//! struct MyJob { /* ... */ }
//!
//! impl StreamJob for MyJob { /* ... */ }
//!
//! // Define your stream
//! struct MyStream;
//! impl StreamDef for MyStream {
//!     const STREAM_NAME: &'static str = "my:jobs";
//!     const CONSUMER_GROUP: &'static str = "my_workers";
//!     const DLQ_STREAM: &'static str = "my:dlq";
//! }
//!
//! // Create processor and run
//! let config = WorkerConfig::from_stream_def::<MyStream>();
//! let worker = StreamWorker::new(redis, processor, config);
//! worker.run(shutdown_rx).await?;
//! ```

mod config;
mod consumer;
mod dlq;
mod error;
mod event;
mod producer;
mod registry;
mod worker;

// Re-export main types
pub use config::WorkerConfig;
pub use consumer::{StreamConsumer, StreamInfo};
pub use dlq::{DlqEntry, DlqManager, DlqStats};
pub use error::{ErrorCategory, StreamError};
pub use event::StreamEvent;
pub use producer::StreamProducer;
pub use registry::{StreamDef, StreamJob};
pub use worker::{StreamProcessor, StreamWorker};
