//! Error types for the notification dispatch domain.

use thiserror::Error;
use uuid::Uuid;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in the notification dispatch domain.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Request failed validation before enqueue.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The dispatch queue could not accept the request.
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Redis queue error.
    #[error("Queue error: {0}")]
    QueueError(String),

    /// Recipient does not exist.
    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    /// Recipient exists but is deactivated.
    #[error("User is inactive: {0}")]
    UserInactive(Uuid),

    /// Preference lookup failed for operational reasons.
    #[error("Preferences unavailable: {0}")]
    PreferencesUnavailable(String),

    /// Notification record not found.
    #[error("Notification not found: {0}")]
    NotificationNotFound(Uuid),

    /// Caller is not allowed to act on this notification.
    #[error("User {user_id} cannot access notification {notification_id}")]
    Forbidden {
        user_id: Uuid,
        notification_id: Uuid,
    },

    /// SMS provider error.
    #[error("SMS provider error: {0}")]
    ProviderError(String),

    /// Database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for NotificationError {
    fn from(err: redis::RedisError) -> Self {
        NotificationError::QueueError(err.to_string())
    }
}

impl From<sea_orm::DbErr> for NotificationError {
    fn from(err: sea_orm::DbErr) -> Self {
        NotificationError::DatabaseError(err.to_string())
    }
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        NotificationError::ProviderError(err.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::Internal(format!("JSON serialization error: {}", err))
    }
}
