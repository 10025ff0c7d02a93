//! Stream definitions for the notification dispatch queue.

use stream_worker::StreamDef;

/// The durable dispatch queue that `NotificationDispatcher` writes to and
/// the worker consumes from.
pub struct NotificationStream;

impl StreamDef for NotificationStream {
    const STREAM_NAME: &'static str = "notifications:dispatch";
    const CONSUMER_GROUP: &'static str = "notification_workers";
    const DLQ_STREAM: &'static str = "notifications:dlq";
    const MAX_LENGTH: i64 = 100_000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_names() {
        assert_eq!(NotificationStream::stream_name(), "notifications:dispatch");
        assert_eq!(NotificationStream::consumer_group(), "notification_workers");
        assert_eq!(NotificationStream::dlq_stream(), "notifications:dlq");
    }
}
