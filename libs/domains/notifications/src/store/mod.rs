//! Persistence for notifications and delivery attempts.

mod memory;
mod postgres;

pub use memory::InMemoryNotificationStore;
pub use postgres::PostgresNotificationStore;

use crate::error::NotificationResult;
use crate::models::{DeliveryAttempt, DeliveryChannel, Notification};
use async_trait::async_trait;
use uuid::Uuid;

/// Storage backend for notification rows and their delivery audit trail.
///
/// Implementations must be idempotent at two points:
/// - `create_notification` dedupes on `idempotency_key` and returns the
///   existing row instead of inserting a second one.
/// - `record_delivery_attempt` is a no-op when an attempt for the same
///   notification and channel already exists.
///
/// Both guarantees together make worker redeliveries safe.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a notification, or return the existing row with the same
    /// idempotency key.
    ///
    /// The boolean is true when a new row was inserted.
    async fn create_notification(
        &self,
        notification: Notification,
    ) -> NotificationResult<(Notification, bool)>;

    /// Look up a notification by its idempotency key.
    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> NotificationResult<Option<Notification>>;

    /// List a user's notifications, newest first. `unread_only` restricts
    /// the listing to rows without a `read_at`.
    async fn list_for_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: u64,
        offset: u64,
    ) -> NotificationResult<Vec<Notification>>;

    /// Count a user's unread notifications.
    async fn unread_count(&self, user_id: Uuid) -> NotificationResult<u64>;

    /// Mark a notification as read on behalf of its owner.
    ///
    /// Idempotent: marking an already-read notification keeps the original
    /// `read_at`. Fails with `Forbidden` when `user_id` does not own the
    /// notification.
    async fn mark_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> NotificationResult<Notification>;

    /// Record one delivery attempt. No-op when an attempt for the same
    /// notification and channel is already recorded.
    ///
    /// The boolean is true when a new attempt row was inserted.
    async fn record_delivery_attempt(
        &self,
        attempt: DeliveryAttempt,
    ) -> NotificationResult<bool>;

    /// List the delivery attempts for a notification.
    async fn delivery_attempts(
        &self,
        notification_id: Uuid,
    ) -> NotificationResult<Vec<DeliveryAttempt>>;

    /// Check whether an attempt for the given channel already exists.
    async fn has_delivery_attempt(
        &self,
        notification_id: Uuid,
        channel: DeliveryChannel,
    ) -> NotificationResult<bool> {
        let attempts = self.delivery_attempts(notification_id).await?;
        Ok(attempts.iter().any(|a| a.channel == channel))
    }
}
