//! Notification dispatch domain.
//!
//! Implements the marketplace notification pipeline:
//!
//! 1. Event sources (order, delivery, payment flows) publish
//!    [`DomainEvent`]s, or call [`NotificationDispatcher::enqueue`]
//!    directly with a [`NotificationRequest`].
//! 2. The dispatcher validates and appends the request to a durable
//!    Redis Stream.
//! 3. [`NotificationProcessor`] consumes the stream inside a
//!    `stream_worker::StreamWorker`, resolves the recipient's
//!    preferences, persists a [`Notification`] row with its
//!    [`DeliveryAttempt`] audit trail, and sends an SMS when the request
//!    and the preferences both call for one.
//!
//! Redeliveries are safe end to end: the notification row dedupes on the
//! request ID and delivery attempts dedupe per channel.

pub mod dispatch;
pub mod error;
pub mod events;
pub mod models;
pub mod preferences;
pub mod processor;
pub mod sms;
pub mod store;
pub mod streams;

pub use dispatch::{BODY_MAX_LEN, NotificationDispatcher, TITLE_MAX_LEN};
pub use error::{NotificationError, NotificationResult};
pub use events::{DeliveryStage, DomainEvent, FarmerShare, NotificationFanout, OrderStatus};
pub use models::{
    DeliveryAttempt, DeliveryChannel, DeliveryStatus, Notification, NotificationRequest,
    NotificationType, RecipientProfile, UserRole,
};
pub use preferences::{InMemoryPreferences, PostgresPreferences, PreferencesReader};
pub use processor::NotificationProcessor;
pub use sms::{GatewayConfig, GatewaySmsClient, MockSmsSender, SmsDelivery, SmsMessage, SmsSender};
pub use store::{InMemoryNotificationStore, NotificationStore, PostgresNotificationStore};
pub use streams::NotificationStream;
