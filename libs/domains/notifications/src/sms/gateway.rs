//! Africa's Talking SMS gateway implementation.

use super::{SmsDelivery, SmsMessage, SmsSender};
use crate::error::{NotificationError, NotificationResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DEFAULT_API_URL: &str = "https://api.africastalking.com/version1";
const SANDBOX_API_URL: &str = "https://api.sandbox.africastalking.com/version1";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Africa's Talking API configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Account username.
    pub username: String,
    /// API key.
    pub api_key: String,
    /// Registered sender ID, if any.
    pub sender_id: Option<String>,
    /// API base URL (sandbox accounts use the sandbox host).
    pub api_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl GatewayConfig {
    /// Create a new gateway configuration.
    ///
    /// The "sandbox" username is routed to the sandbox host.
    pub fn new(username: String, api_key: String) -> Self {
        let api_url = if username == "sandbox" {
            SANDBOX_API_URL.to_string()
        } else {
            DEFAULT_API_URL.to_string()
        };

        Self {
            username,
            api_key,
            sender_id: None,
            api_url,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Returns `None` when either credential is absent, in which case the
    /// pipeline runs with SMS disabled.
    pub fn from_env() -> Option<Self> {
        let username = std::env::var("SMS_PROVIDER_USERNAME").ok()?;
        let api_key = std::env::var("SMS_PROVIDER_API_KEY").ok()?;

        if username.is_empty() || api_key.is_empty() {
            return None;
        }

        let mut config = Self::new(username, api_key);
        config.sender_id = std::env::var("SMS_PROVIDER_SENDER_ID").ok();
        if let Ok(secs) = std::env::var("SMS_REQUEST_TIMEOUT_SECONDS")
            && let Ok(secs) = secs.parse::<u64>()
        {
            config.request_timeout = Duration::from_secs(secs);
        }
        Some(config)
    }
}

/// Africa's Talking SMS provider.
///
/// When constructed without credentials the client is disabled and every
/// send comes back as [`SmsDelivery::Skipped`].
pub struct GatewaySmsClient {
    config: Option<GatewayConfig>,
    client: Client,
}

impl GatewaySmsClient {
    /// Create a new gateway client.
    pub fn new(config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();

        Self {
            config: Some(config),
            client,
        }
    }

    /// Create a disabled client that skips every send.
    pub fn disabled() -> Self {
        Self {
            config: None,
            client: Client::new(),
        }
    }

    /// Create a client from environment variables.
    ///
    /// Missing credentials produce a disabled client rather than an error,
    /// so deployments without an SMS contract still process notifications.
    pub fn from_env() -> Self {
        match GatewayConfig::from_env() {
            Some(config) => Self::new(config),
            None => {
                warn!("SMS provider credentials not configured, SMS sending is disabled");
                Self::disabled()
            }
        }
    }

    /// Whether the client has credentials.
    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }
}

// Africa's Talking API response structures

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(rename = "SMSMessageData")]
    sms_message_data: SmsMessageData,
}

#[derive(Debug, Deserialize)]
struct SmsMessageData {
    #[serde(rename = "Recipients", default)]
    recipients: Vec<Recipient>,
}

#[derive(Debug, Deserialize)]
struct Recipient {
    status: String,
    #[serde(rename = "statusCode", default)]
    status_code: Option<i64>,
    #[serde(rename = "messageId", default)]
    message_id: Option<String>,
}

/// Map a gateway response body to a delivery outcome.
///
/// An HTTP-success response can still carry a per-recipient rejection,
/// reported as a non-"Success" status with a numeric code.
fn delivery_from_response(parsed: &SendResponse) -> SmsDelivery {
    let Some(recipient) = parsed.sms_message_data.recipients.first() else {
        return SmsDelivery::Rejected {
            code: "no recipient in gateway response".to_string(),
        };
    };

    if recipient.status == "Success" {
        SmsDelivery::Sent {
            provider_reference: recipient.message_id.clone(),
        }
    } else {
        SmsDelivery::Rejected {
            code: match recipient.status_code {
                Some(code) => format!("{} ({})", recipient.status, code),
                None => recipient.status.clone(),
            },
        }
    }
}

#[async_trait]
impl SmsSender for GatewaySmsClient {
    async fn send(&self, sms: &SmsMessage) -> NotificationResult<SmsDelivery> {
        let Some(config) = &self.config else {
            return Ok(SmsDelivery::Skipped {
                reason: "SMS provider not configured".to_string(),
            });
        };

        if sms.to_number.is_empty() || sms.body.is_empty() {
            return Ok(SmsDelivery::Skipped {
                reason: "missing recipient number or message body".to_string(),
            });
        }

        let mut form = vec![
            ("username", config.username.clone()),
            ("to", sms.to_number.clone()),
            ("message", sms.body.clone()),
        ];
        if let Some(sender_id) = &config.sender_id {
            form.push(("from", sender_id.clone()));
        }

        debug!(to = %sms.to_number, "Sending SMS via Africa's Talking");

        let response = self
            .client
            .post(format!("{}/messaging", config.api_url))
            .header("apiKey", &config.api_key)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                to = %sms.to_number,
                status = %status,
                error = %body,
                "SMS gateway returned an error status"
            );
            return Err(NotificationError::ProviderError(format!(
                "Gateway error ({}): {}",
                status, body
            )));
        }

        let parsed: SendResponse = response.json().await?;
        let delivery = delivery_from_response(&parsed);
        match &delivery {
            SmsDelivery::Sent { provider_reference } => {
                info!(
                    to = %sms.to_number,
                    message_id = ?provider_reference,
                    "SMS sent successfully"
                );
            }
            SmsDelivery::Rejected { code } => {
                warn!(
                    to = %sms.to_number,
                    code = %code,
                    "SMS rejected by gateway"
                );
            }
            SmsDelivery::Skipped { .. } => {}
        }
        Ok(delivery)
    }

    fn name(&self) -> &'static str {
        "AfricasTalking"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        // No dedicated health endpoint; configured credentials are enough
        Ok(self.is_configured())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_username_selects_sandbox_host() {
        let config = GatewayConfig::new("sandbox".to_string(), "key".to_string());
        assert_eq!(config.api_url, SANDBOX_API_URL);

        let config = GatewayConfig::new("prod-account".to_string(), "key".to_string());
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[tokio::test]
    async fn test_disabled_client_skips() {
        let client = GatewaySmsClient::disabled();
        let delivery = client
            .send(&SmsMessage {
                to_number: "+254712345678".to_string(),
                body: "hello".to_string(),
            })
            .await
            .unwrap();

        assert!(matches!(delivery, SmsDelivery::Skipped { .. }));
        assert!(!client.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_recipient_skips() {
        let client = GatewaySmsClient::new(GatewayConfig::new(
            "sandbox".to_string(),
            "key".to_string(),
        ));
        let delivery = client
            .send(&SmsMessage {
                to_number: String::new(),
                body: "hello".to_string(),
            })
            .await
            .unwrap();

        assert!(matches!(delivery, SmsDelivery::Skipped { .. }));
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "SMSMessageData": {
                "Message": "Sent to 1/1",
                "Recipients": [{
                    "statusCode": 101,
                    "number": "+254712345678",
                    "status": "Success",
                    "cost": "KES 0.8000",
                    "messageId": "ATXid_abc123"
                }]
            }
        }"#;

        let parsed: SendResponse = serde_json::from_str(json).unwrap();
        let recipient = &parsed.sms_message_data.recipients[0];
        assert_eq!(recipient.status, "Success");
        assert_eq!(recipient.message_id.as_deref(), Some("ATXid_abc123"));

        let delivery = delivery_from_response(&parsed);
        assert!(matches!(
            delivery,
            SmsDelivery::Sent { provider_reference: Some(ref id) } if id == "ATXid_abc123"
        ));
    }

    #[test]
    fn test_rejected_recipient_in_successful_response() {
        let json = r#"{
            "SMSMessageData": {
                "Message": "Sent to 0/1",
                "Recipients": [{
                    "statusCode": 406,
                    "number": "+254712345678",
                    "status": "UserInBlacklist",
                    "cost": "0"
                }]
            }
        }"#;

        let parsed: SendResponse = serde_json::from_str(json).unwrap();
        let delivery = delivery_from_response(&parsed);
        assert!(matches!(
            delivery,
            SmsDelivery::Rejected { ref code } if code == "UserInBlacklist (406)"
        ));
    }

    #[test]
    fn test_empty_recipient_list_is_rejected() {
        let json = r#"{"SMSMessageData": {"Message": "InvalidSenderId", "Recipients": []}}"#;
        let parsed: SendResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            delivery_from_response(&parsed),
            SmsDelivery::Rejected { .. }
        ));
    }
}
