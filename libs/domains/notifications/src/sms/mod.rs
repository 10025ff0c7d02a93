//! SMS provider implementations.
//!
//! This module contains the `SmsSender` trait, the Africa's Talking
//! gateway client, and a mock sender for tests.

mod gateway;
mod mock;

pub use gateway::{GatewayConfig, GatewaySmsClient};
pub use mock::MockSmsSender;

use crate::error::NotificationResult;
use async_trait::async_trait;

/// An SMS ready for sending.
#[derive(Debug, Clone)]
pub struct SmsMessage {
    /// Recipient phone number in E.164 format (e.g., "+254712345678").
    pub to_number: String,
    /// Message text.
    pub body: String,
}

/// Outcome of an SMS send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsDelivery {
    /// The provider accepted the message.
    Sent {
        /// Provider message reference, when returned.
        provider_reference: Option<String>,
    },
    /// The send was skipped without contacting the provider.
    Skipped { reason: String },
    /// The provider rejected the message.
    Rejected { code: String },
}

/// Trait for SMS sending providers.
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Send an SMS.
    ///
    /// Errors are reserved for transport failures; a provider-side
    /// rejection comes back as [`SmsDelivery::Rejected`].
    async fn send(&self, sms: &SmsMessage) -> NotificationResult<SmsDelivery>;

    /// Get the provider name for logging.
    fn name(&self) -> &'static str;

    /// Check if the provider is healthy/configured.
    async fn health_check(&self) -> NotificationResult<bool>;
}
