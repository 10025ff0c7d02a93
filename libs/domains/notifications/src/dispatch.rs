//! Enqueue façade for the notification dispatch pipeline.
//!
//! Event sources (order flows, delivery flows, payment hooks) call
//! [`NotificationDispatcher::enqueue`] to hand a request to the durable
//! queue. The call validates, appends to the Redis Stream, and returns;
//! all recipient resolution and delivery happens in the worker.

use crate::error::{NotificationError, NotificationResult};
use crate::models::NotificationRequest;
use crate::streams::NotificationStream;
use redis::aio::ConnectionManager;
use std::time::Duration;
use stream_worker::StreamProducer;
use tracing::{debug, warn};
use uuid::Uuid;

/// Maximum title length in characters.
pub const TITLE_MAX_LEN: usize = 120;
/// Maximum body length in characters.
pub const BODY_MAX_LEN: usize = 1000;

/// Number of enqueue attempts before giving up on the queue.
const ENQUEUE_ATTEMPTS: u32 = 3;
/// Base delay between enqueue attempts.
const ENQUEUE_RETRY_DELAY_MS: u64 = 100;

/// Façade over the dispatch stream.
#[derive(Clone)]
pub struct NotificationDispatcher {
    producer: StreamProducer,
}

impl NotificationDispatcher {
    /// Create a dispatcher writing to the notification dispatch stream.
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            producer: StreamProducer::from_stream_def::<NotificationStream>(redis),
        }
    }

    /// Validate and enqueue a notification request.
    ///
    /// Returns the request ID, which doubles as the idempotency key for
    /// the eventual notification row. The queue append is retried a few
    /// times before reporting [`NotificationError::QueueUnavailable`].
    pub async fn enqueue(&self, request: NotificationRequest) -> NotificationResult<Uuid> {
        Self::validate(&request)?;

        let request_id = request.request_id;
        let mut last_error = None;

        for attempt in 1..=ENQUEUE_ATTEMPTS {
            match self.producer.send(&request).await {
                Ok(stream_id) => {
                    debug!(
                        request_id = %request_id,
                        user_id = %request.user_id,
                        notification_type = %request.notification_type,
                        stream_id = %stream_id,
                        "Enqueued notification request"
                    );
                    return Ok(request_id);
                }
                Err(e) => {
                    warn!(
                        request_id = %request_id,
                        attempt = %attempt,
                        error = %e,
                        "Failed to enqueue notification request"
                    );
                    last_error = Some(e);
                    if attempt < ENQUEUE_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(
                            ENQUEUE_RETRY_DELAY_MS * u64::from(attempt),
                        ))
                        .await;
                    }
                }
            }
        }

        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown queue error".to_string());
        Err(NotificationError::QueueUnavailable(detail))
    }

    fn validate(request: &NotificationRequest) -> NotificationResult<()> {
        if request.user_id.is_nil() {
            return Err(NotificationError::Validation(
                "user_id must not be nil".to_string(),
            ));
        }

        if request.title.trim().is_empty() {
            return Err(NotificationError::Validation(
                "title must not be empty".to_string(),
            ));
        }

        if request.title.chars().count() > TITLE_MAX_LEN {
            return Err(NotificationError::Validation(format!(
                "title exceeds {} characters",
                TITLE_MAX_LEN
            )));
        }

        if request.body.chars().count() > BODY_MAX_LEN {
            return Err(NotificationError::Validation(format!(
                "body exceeds {} characters",
                BODY_MAX_LEN
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationType;

    fn valid_request() -> NotificationRequest {
        NotificationRequest::new(
            Uuid::new_v4(),
            NotificationType::OrderUpdate,
            "Order Confirmed #1001",
            "Your order has been confirmed.",
        )
    }

    #[test]
    fn test_validate_accepts_valid_request() {
        assert!(NotificationDispatcher::validate(&valid_request()).is_ok());
    }

    #[test]
    fn test_validate_rejects_nil_user() {
        let mut request = valid_request();
        request.user_id = Uuid::nil();

        assert!(matches!(
            NotificationDispatcher::validate(&request),
            Err(NotificationError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_blank_title() {
        let mut request = valid_request();
        request.title = "   ".to_string();

        assert!(matches!(
            NotificationDispatcher::validate(&request),
            Err(NotificationError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_oversized_title_and_body() {
        let mut request = valid_request();
        request.title = "t".repeat(TITLE_MAX_LEN + 1);
        assert!(NotificationDispatcher::validate(&request).is_err());

        let mut request = valid_request();
        request.body = "b".repeat(BODY_MAX_LEN + 1);
        assert!(NotificationDispatcher::validate(&request).is_err());
    }

    #[test]
    fn test_validate_counts_characters_not_bytes() {
        let mut request = valid_request();
        // 120 multibyte characters is exactly at the limit
        request.title = "é".repeat(TITLE_MAX_LEN);
        assert!(NotificationDispatcher::validate(&request).is_ok());
    }
}
