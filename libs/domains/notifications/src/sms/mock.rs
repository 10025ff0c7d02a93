//! Mock SMS sender for tests.

use super::{SmsDelivery, SmsMessage, SmsSender};
use crate::error::{NotificationError, NotificationResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Scripted behavior for the mock sender.
#[derive(Debug, Clone)]
enum MockBehavior {
    Accept,
    Reject(String),
    TransportError(String),
}

/// Recording SMS sender for tests.
///
/// Accepts every message by default; use the `reject`/`fail_transport`
/// constructors to script failures. All sent messages are recorded for
/// assertions.
#[derive(Clone)]
pub struct MockSmsSender {
    behavior: MockBehavior,
    calls: Arc<Mutex<Vec<SmsMessage>>>,
}

impl Default for MockSmsSender {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSmsSender {
    /// Mock that accepts every message.
    pub fn new() -> Self {
        Self {
            behavior: MockBehavior::Accept,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Mock whose provider rejects every message with the given code.
    pub fn reject(code: impl Into<String>) -> Self {
        Self {
            behavior: MockBehavior::Reject(code.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Mock whose transport fails on every send.
    pub fn fail_transport(message: impl Into<String>) -> Self {
        Self {
            behavior: MockBehavior::TransportError(message.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Messages handed to the sender so far, including rejected ones.
    pub async fn sent_messages(&self) -> Vec<SmsMessage> {
        self.calls.lock().await.clone()
    }

    /// Number of send calls so far.
    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl SmsSender for MockSmsSender {
    async fn send(&self, sms: &SmsMessage) -> NotificationResult<SmsDelivery> {
        self.calls.lock().await.push(sms.clone());

        match &self.behavior {
            MockBehavior::Accept => Ok(SmsDelivery::Sent {
                provider_reference: Some(format!("mock-{}", self.calls.lock().await.len())),
            }),
            MockBehavior::Reject(code) => Ok(SmsDelivery::Rejected { code: code.clone() }),
            MockBehavior::TransportError(message) => {
                Err(NotificationError::ProviderError(message.clone()))
            }
        }
    }

    fn name(&self) -> &'static str {
        "MockSms"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_calls() {
        let sender = MockSmsSender::new();
        let sms = SmsMessage {
            to_number: "+254712345678".to_string(),
            body: "hello".to_string(),
        };

        let delivery = sender.send(&sms).await.unwrap();
        assert!(matches!(delivery, SmsDelivery::Sent { .. }));
        assert_eq!(sender.call_count().await, 1);
        assert_eq!(sender.sent_messages().await[0].body, "hello");
    }

    #[tokio::test]
    async fn test_mock_reject() {
        let sender = MockSmsSender::reject("UserInBlacklist (406)");
        let sms = SmsMessage {
            to_number: "+254712345678".to_string(),
            body: "hello".to_string(),
        };

        let delivery = sender.send(&sms).await.unwrap();
        assert!(matches!(delivery, SmsDelivery::Rejected { .. }));
        // Rejected sends are still recorded
        assert_eq!(sender.call_count().await, 1);
    }
}
