//! Stream definitions and job traits.
//!
//! This module provides:
//! - `StreamDef` trait for domain-specific stream definitions
//! - `StreamJob` trait for job payloads

use serde::{Serialize, de::DeserializeOwned};

/// Trait for stream job payloads.
///
/// Domain models that represent jobs in a stream implement this trait.
/// Delivery accounting lives in the stream's pending entries list, not in
/// the payload, so a job only has to identify itself.
pub trait StreamJob: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the job ID for logging and tracking.
    fn job_id(&self) -> String;
}

/// Stream definition trait.
///
/// Each domain implements this trait to define their stream configuration.
/// This enables type-safe stream configuration and consistent naming conventions.
///
/// # Example
///
/// ```rust,ignore
/// use stream_worker::StreamDef;
///
/// pub struct DispatchStream;
///
/// impl StreamDef for DispatchStream {
///     const STREAM_NAME: &'static str = "notifications:dispatch";
///     const CONSUMER_GROUP: &'static str = "notification_workers";
///     const DLQ_STREAM: &'static str = "notifications:dlq";
/// }
/// ```
pub trait StreamDef: Send + Sync {
    /// The Redis stream name (e.g., "notifications:dispatch").
    const STREAM_NAME: &'static str;

    /// The consumer group name for this stream.
    const CONSUMER_GROUP: &'static str;

    /// The dead letter queue stream name for failed jobs.
    const DLQ_STREAM: &'static str;

    /// Maximum stream length before auto-trim (MAXLEN).
    /// Default: 100,000 entries.
    const MAX_LENGTH: i64 = 100_000;

    /// Get the stream name.
    fn stream_name() -> &'static str {
        Self::STREAM_NAME
    }

    /// Get the consumer group name.
    fn consumer_group() -> &'static str {
        Self::CONSUMER_GROUP
    }

    /// Get the DLQ stream name.
    fn dlq_stream() -> &'static str {
        Self::DLQ_STREAM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestStream;
    impl StreamDef for TestStream {
        const STREAM_NAME: &'static str = "test:stream";
        const CONSUMER_GROUP: &'static str = "test_workers";
        const DLQ_STREAM: &'static str = "test:dlq";
    }

    #[test]
    fn test_stream_def() {
        assert_eq!(TestStream::stream_name(), "test:stream");
        assert_eq!(TestStream::consumer_group(), "test_workers");
        assert_eq!(TestStream::dlq_stream(), "test:dlq");
        assert_eq!(TestStream::MAX_LENGTH, 100_000);
    }
}
