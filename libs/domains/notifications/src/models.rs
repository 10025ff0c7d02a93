//! Data models for the notification dispatch domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stream_worker::StreamJob;
use uuid::Uuid;

// ============================================================================
// Notification Job Types (for Redis Stream queue)
// ============================================================================

/// Categories of notifications that can be dispatched.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationType {
    /// Order lifecycle updates (created, confirmed, delivered, ...).
    OrderUpdate,
    /// Weather advisories for farmers.
    WeatherAlert,
    /// Produce price movement alerts.
    PriceUpdate,
    /// Promotional content.
    Marketing,
    /// Operational messages from the platform.
    SystemMessage,
    /// Payment confirmation.
    PaymentReceived,
}

/// Role of a notification recipient.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
    Customer,
    Farmer,
    Rider,
    Admin,
}

/// A notification request to be processed by the worker.
///
/// This is the wire format placed on the dispatch stream. `request_id`
/// doubles as the idempotency key, so redeliveries of the same stream
/// entry never create duplicate notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Unique request identifier (also the idempotency key).
    pub request_id: Uuid,
    /// Recipient user ID.
    pub user_id: Uuid,
    /// Category of the notification.
    pub notification_type: NotificationType,
    /// Short headline, at most 120 characters.
    pub title: String,
    /// Full message text, at most 1000 characters.
    pub body: String,
    /// Whether the caller wants an SMS in addition to the in-app record.
    pub sms_requested: bool,
    /// Related entity (order, delivery, ...) if any.
    pub related_id: Option<Uuid>,
    /// When the request was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl NotificationRequest {
    /// Create a new notification request.
    pub fn new(
        user_id: Uuid,
        notification_type: NotificationType,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id,
            notification_type,
            title: title.into(),
            body: body.into(),
            sms_requested: false,
            related_id: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Request SMS delivery in addition to the in-app record.
    pub fn with_sms(mut self) -> Self {
        self.sms_requested = true;
        self
    }

    /// Attach a related entity ID.
    pub fn with_related_id(mut self, related_id: Uuid) -> Self {
        self.related_id = Some(related_id);
        self
    }
}

impl StreamJob for NotificationRequest {
    fn job_id(&self) -> String {
        self.request_id.to_string()
    }
}

// ============================================================================
// Recipient Preferences
// ============================================================================

/// Notification preferences and contact details for a recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientProfile {
    pub user_id: Uuid,
    pub role: UserRole,
    pub phone_number: Option<String>,
    pub is_active: bool,
    /// Master SMS switch. When false no SMS is ever sent.
    pub sms_notifications: bool,
    pub order_updates: bool,
    pub weather_alerts: bool,
    pub price_alerts: bool,
    pub marketing_notifications: bool,
}

impl RecipientProfile {
    /// Create a profile with default opt-ins for a user.
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self {
            user_id,
            role,
            phone_number: None,
            is_active: true,
            sms_notifications: true,
            order_updates: true,
            weather_alerts: true,
            price_alerts: true,
            marketing_notifications: false,
        }
    }

    /// Whether this recipient accepts the given notification category.
    ///
    /// Weather alerts additionally require the farmer role. System messages
    /// and payment confirmations cannot be opted out of.
    pub fn allows(&self, notification_type: NotificationType) -> bool {
        match notification_type {
            NotificationType::OrderUpdate => self.order_updates,
            NotificationType::WeatherAlert => {
                self.weather_alerts && self.role == UserRole::Farmer
            }
            NotificationType::PriceUpdate => self.price_alerts,
            NotificationType::Marketing => self.marketing_notifications,
            NotificationType::SystemMessage | NotificationType::PaymentReceived => true,
        }
    }
}

// ============================================================================
// Database Models
// ============================================================================

/// A persisted notification record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    /// Whether SMS delivery was attempted for this notification.
    ///
    /// True only when the caller requested SMS and the recipient's
    /// preferences allow it.
    pub sms_effective: bool,
    pub related_id: Option<Uuid>,
    /// Idempotency key, the stringified request ID.
    pub idempotency_key: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Build the notification row for a processed request.
    pub fn from_request(request: &NotificationRequest, sms_effective: bool) -> Self {
        Self {
            notification_id: Uuid::new_v4(),
            user_id: request.user_id,
            notification_type: request.notification_type,
            title: request.title.clone(),
            body: request.body.clone(),
            sms_effective,
            related_id: request.related_id,
            idempotency_key: request.request_id.to_string(),
            read_at: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the notification has been read.
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Channel through which a delivery was attempted.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryChannel {
    Sms,
    Inapp,
}

/// Outcome of a delivery attempt.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    Failed,
    Skipped,
}

/// Audit record of one delivery attempt on one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub attempt_id: Uuid,
    pub notification_id: Uuid,
    pub channel: DeliveryChannel,
    pub status: DeliveryStatus,
    /// Provider message reference on success, when the provider returns one.
    pub provider_reference: Option<String>,
    /// Error or skip detail, when not successful.
    pub detail: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl DeliveryAttempt {
    /// Record a successful delivery.
    pub fn success(
        notification_id: Uuid,
        channel: DeliveryChannel,
        provider_reference: Option<String>,
    ) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            notification_id,
            channel,
            status: DeliveryStatus::Success,
            provider_reference,
            detail: None,
            attempted_at: Utc::now(),
        }
    }

    /// Record a failed delivery.
    pub fn failed(notification_id: Uuid, channel: DeliveryChannel, detail: impl Into<String>) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            notification_id,
            channel,
            status: DeliveryStatus::Failed,
            provider_reference: None,
            detail: Some(detail.into()),
            attempted_at: Utc::now(),
        }
    }

    /// Record a skipped delivery (e.g., provider not configured).
    pub fn skipped(
        notification_id: Uuid,
        channel: DeliveryChannel,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            notification_id,
            channel,
            status: DeliveryStatus::Skipped,
            provider_reference: None,
            detail: Some(reason.into()),
            attempted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_type_serde_snake_case() {
        let json = serde_json::to_string(&NotificationType::WeatherAlert).unwrap();
        assert_eq!(json, "\"weather_alert\"");

        let parsed: NotificationType = serde_json::from_str("\"payment_received\"").unwrap();
        assert_eq!(parsed, NotificationType::PaymentReceived);
    }

    #[test]
    fn test_request_job_id_is_request_id() {
        let request = NotificationRequest::new(
            Uuid::new_v4(),
            NotificationType::OrderUpdate,
            "Order Confirmed #1001",
            "Your order has been confirmed.",
        );

        assert_eq!(request.job_id(), request.request_id.to_string());
    }

    #[test]
    fn test_profile_allows_weather_requires_farmer() {
        let mut profile = RecipientProfile::new(Uuid::new_v4(), UserRole::Customer);
        assert!(!profile.allows(NotificationType::WeatherAlert));

        profile.role = UserRole::Farmer;
        assert!(profile.allows(NotificationType::WeatherAlert));

        profile.weather_alerts = false;
        assert!(!profile.allows(NotificationType::WeatherAlert));
    }

    #[test]
    fn test_profile_always_allows_system_messages() {
        let mut profile = RecipientProfile::new(Uuid::new_v4(), UserRole::Customer);
        profile.order_updates = false;
        profile.price_alerts = false;
        profile.marketing_notifications = false;

        assert!(profile.allows(NotificationType::SystemMessage));
        assert!(profile.allows(NotificationType::PaymentReceived));
        assert!(!profile.allows(NotificationType::OrderUpdate));
    }

    #[test]
    fn test_notification_from_request_copies_idempotency_key() {
        let request = NotificationRequest::new(
            Uuid::new_v4(),
            NotificationType::SystemMessage,
            "Welcome",
            "Thanks for joining.",
        );

        let notification = Notification::from_request(&request, true);
        assert_eq!(notification.idempotency_key, request.request_id.to_string());
        assert!(notification.sms_effective);
        assert!(!notification.is_read());
    }
}
