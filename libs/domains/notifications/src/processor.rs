//! Worker-side processing of notification requests.
//!
//! The processor turns a queued [`NotificationRequest`] into a persisted
//! [`Notification`] row plus per-channel [`DeliveryAttempt`] records,
//! sending an SMS when the request and the recipient's preferences both
//! call for one.

use crate::error::{NotificationError, NotificationResult};
use crate::models::{DeliveryAttempt, DeliveryChannel, Notification, NotificationRequest};
use crate::preferences::PreferencesReader;
use crate::sms::{SmsDelivery, SmsMessage, SmsSender};
use crate::store::NotificationStore;
use async_trait::async_trait;
use std::sync::Arc;
use stream_worker::{StreamError, StreamProcessor};
use tracing::{debug, info, warn};

/// Processes notification requests from the dispatch stream.
pub struct NotificationProcessor {
    store: Arc<dyn NotificationStore>,
    preferences: Arc<dyn PreferencesReader>,
    sms: Arc<dyn SmsSender>,
}

impl NotificationProcessor {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        preferences: Arc<dyn PreferencesReader>,
        sms: Arc<dyn SmsSender>,
    ) -> Self {
        Self {
            store,
            preferences,
            sms,
        }
    }

    /// Process one request end to end.
    ///
    /// Safe to call again for the same request: the store dedupes the
    /// notification row on the request ID and delivery attempts on
    /// (notification, channel), so a redelivery never duplicates rows or
    /// re-sends an SMS that was already attempted.
    pub async fn handle(&self, request: &NotificationRequest) -> NotificationResult<()> {
        let profile = match self.preferences.profile(request.user_id).await {
            Ok(profile) => profile,
            Err(
                e @ (NotificationError::UserNotFound(_) | NotificationError::UserInactive(_)),
            ) => {
                warn!(
                    request_id = %request.request_id,
                    user_id = %request.user_id,
                    reason = %e,
                    "Dropping notification request"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let sms_effective = request.sms_requested
            && profile.sms_notifications
            && profile.allows(request.notification_type);

        let (notification, inserted) = self
            .store
            .create_notification(Notification::from_request(request, sms_effective))
            .await?;

        if inserted {
            info!(
                request_id = %request.request_id,
                notification_id = %notification.notification_id,
                user_id = %notification.user_id,
                notification_type = %notification.notification_type,
                sms_effective = %notification.sms_effective,
                "Created notification"
            );
        } else {
            debug!(
                request_id = %request.request_id,
                notification_id = %notification.notification_id,
                "Notification already exists, resuming delivery"
            );
        }

        // Persisting the row is the in-app delivery
        self.store
            .record_delivery_attempt(DeliveryAttempt::success(
                notification.notification_id,
                DeliveryChannel::Inapp,
                None,
            ))
            .await?;

        // A row created by an earlier delivery decides whether SMS applies,
        // so a preference change between redeliveries cannot flip it
        if notification.sms_effective {
            self.deliver_sms(&notification, profile.phone_number.as_deref())
                .await?;
        }

        Ok(())
    }

    /// Attempt SMS delivery once per notification.
    ///
    /// Provider failures are recorded on the attempt row and do not fail
    /// the job; there is no SMS-level retry.
    async fn deliver_sms(
        &self,
        notification: &Notification,
        phone_number: Option<&str>,
    ) -> NotificationResult<()> {
        let already_attempted = self
            .store
            .has_delivery_attempt(notification.notification_id, DeliveryChannel::Sms)
            .await?;
        if already_attempted {
            debug!(
                notification_id = %notification.notification_id,
                "SMS already attempted, skipping"
            );
            return Ok(());
        }

        let Some(to_number) = phone_number.filter(|n| !n.is_empty()) else {
            self.store
                .record_delivery_attempt(DeliveryAttempt::skipped(
                    notification.notification_id,
                    DeliveryChannel::Sms,
                    "no phone number on file",
                ))
                .await?;
            return Ok(());
        };

        if notification.body.trim().is_empty() {
            self.store
                .record_delivery_attempt(DeliveryAttempt::skipped(
                    notification.notification_id,
                    DeliveryChannel::Sms,
                    "empty message body",
                ))
                .await?;
            return Ok(());
        }

        let sms = SmsMessage {
            to_number: to_number.to_string(),
            body: notification.body.clone(),
        };

        let attempt = match self.sms.send(&sms).await {
            Ok(SmsDelivery::Sent { provider_reference }) => DeliveryAttempt::success(
                notification.notification_id,
                DeliveryChannel::Sms,
                provider_reference,
            ),
            Ok(SmsDelivery::Skipped { reason }) => DeliveryAttempt::skipped(
                notification.notification_id,
                DeliveryChannel::Sms,
                reason,
            ),
            Ok(SmsDelivery::Rejected { code }) => {
                warn!(
                    notification_id = %notification.notification_id,
                    code = %code,
                    "SMS rejected by provider"
                );
                DeliveryAttempt::failed(notification.notification_id, DeliveryChannel::Sms, code)
            }
            Err(e) => {
                warn!(
                    notification_id = %notification.notification_id,
                    error = %e,
                    "SMS send failed"
                );
                DeliveryAttempt::failed(
                    notification.notification_id,
                    DeliveryChannel::Sms,
                    e.to_string(),
                )
            }
        };

        self.store.record_delivery_attempt(attempt).await?;
        Ok(())
    }
}

/// Map domain errors to queue error categories.
///
/// Operational failures (database, preference lookups) are transient and
/// lead to redelivery; everything else is permanent and dead-letters.
fn to_stream_error(err: NotificationError) -> StreamError {
    match err {
        NotificationError::DatabaseError(_)
        | NotificationError::PreferencesUnavailable(_)
        | NotificationError::QueueError(_)
        | NotificationError::QueueUnavailable(_) => StreamError::transient(err.to_string()),
        _ => StreamError::permanent(err.to_string()),
    }
}

#[async_trait]
impl StreamProcessor<NotificationRequest> for NotificationProcessor {
    async fn process(&self, job: &NotificationRequest) -> Result<(), StreamError> {
        self.handle(job).await.map_err(to_stream_error)
    }

    fn name(&self) -> &'static str {
        "NotificationProcessor"
    }

    async fn health_check(&self) -> Result<bool, StreamError> {
        self.sms
            .health_check()
            .await
            .map_err(|e| StreamError::transient(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationType, RecipientProfile, UserRole};
    use crate::preferences::InMemoryPreferences;
    use crate::sms::MockSmsSender;
    use crate::store::InMemoryNotificationStore;
    use stream_worker::ErrorCategory;
    use uuid::Uuid;

    fn processor(
        store: InMemoryNotificationStore,
        prefs: InMemoryPreferences,
        sms: MockSmsSender,
    ) -> NotificationProcessor {
        NotificationProcessor::new(Arc::new(store), Arc::new(prefs), Arc::new(sms))
    }

    fn request(user_id: Uuid) -> NotificationRequest {
        NotificationRequest::new(
            user_id,
            NotificationType::OrderUpdate,
            "Order Confirmed #1001",
            "Your order has been confirmed.",
        )
        .with_sms()
    }

    #[tokio::test]
    async fn test_unknown_user_is_dropped_without_row() {
        let store = InMemoryNotificationStore::new();
        let processor = processor(
            store.clone(),
            InMemoryPreferences::new(),
            MockSmsSender::new(),
        );

        processor.handle(&request(Uuid::new_v4())).await.unwrap();
        assert_eq!(store.notification_count().await, 0);
    }

    #[tokio::test]
    async fn test_inactive_user_is_dropped_without_row() {
        let store = InMemoryNotificationStore::new();
        let prefs = InMemoryPreferences::new();
        let mut profile = RecipientProfile::new(Uuid::new_v4(), UserRole::Customer);
        profile.is_active = false;
        let user_id = profile.user_id;
        prefs.upsert(profile).await;

        let processor = processor(store.clone(), prefs, MockSmsSender::new());
        processor.handle(&request(user_id)).await.unwrap();
        assert_eq!(store.notification_count().await, 0);
    }

    #[tokio::test]
    async fn test_opted_out_recipient_gets_no_sms_attempt() {
        let store = InMemoryNotificationStore::new();
        let prefs = InMemoryPreferences::new();
        let sms = MockSmsSender::new();

        let mut profile = RecipientProfile::new(Uuid::new_v4(), UserRole::Customer);
        profile.sms_notifications = false;
        profile.phone_number = Some("+254712345678".to_string());
        let user_id = profile.user_id;
        prefs.upsert(profile).await;

        let processor = processor(store.clone(), prefs, sms.clone());
        let req = request(user_id);
        processor.handle(&req).await.unwrap();

        let notification = store
            .find_by_idempotency_key(&req.request_id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert!(!notification.sms_effective);

        let attempts = store
            .delivery_attempts(notification.notification_id)
            .await
            .unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].channel, DeliveryChannel::Inapp);
        assert_eq!(sms.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_sms_provider_failure_does_not_fail_job() {
        let store = InMemoryNotificationStore::new();
        let prefs = InMemoryPreferences::new();
        let sms = MockSmsSender::fail_transport("connection reset");

        let mut profile = RecipientProfile::new(Uuid::new_v4(), UserRole::Customer);
        profile.phone_number = Some("+254712345678".to_string());
        let user_id = profile.user_id;
        prefs.upsert(profile).await;

        let processor = processor(store.clone(), prefs, sms);
        let req = request(user_id);
        processor.handle(&req).await.unwrap();

        let notification = store
            .find_by_idempotency_key(&req.request_id.to_string())
            .await
            .unwrap()
            .unwrap();
        let attempts = store
            .delivery_attempts(notification.notification_id)
            .await
            .unwrap();

        let sms_attempt = attempts
            .iter()
            .find(|a| a.channel == DeliveryChannel::Sms)
            .unwrap();
        assert_eq!(sms_attempt.status, crate::models::DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn test_missing_phone_records_skipped_attempt() {
        let store = InMemoryNotificationStore::new();
        let prefs = InMemoryPreferences::new();

        let profile = RecipientProfile::new(Uuid::new_v4(), UserRole::Customer);
        let user_id = profile.user_id;
        prefs.upsert(profile).await;

        let processor = processor(store.clone(), prefs, MockSmsSender::new());
        let req = request(user_id);
        processor.handle(&req).await.unwrap();

        let notification = store
            .find_by_idempotency_key(&req.request_id.to_string())
            .await
            .unwrap()
            .unwrap();
        let attempts = store
            .delivery_attempts(notification.notification_id)
            .await
            .unwrap();

        let sms_attempt = attempts
            .iter()
            .find(|a| a.channel == DeliveryChannel::Sms)
            .unwrap();
        assert_eq!(sms_attempt.status, crate::models::DeliveryStatus::Skipped);
    }

    #[tokio::test]
    async fn test_empty_body_records_skipped_attempt_without_provider_call() {
        let store = InMemoryNotificationStore::new();
        let prefs = InMemoryPreferences::new();
        let sms = MockSmsSender::new();

        let mut profile = RecipientProfile::new(Uuid::new_v4(), UserRole::Customer);
        profile.phone_number = Some("+254712345678".to_string());
        let user_id = profile.user_id;
        prefs.upsert(profile).await;

        let processor = processor(store.clone(), prefs, sms.clone());
        let req =
            NotificationRequest::new(user_id, NotificationType::OrderUpdate, "Order Update", "")
                .with_sms();
        processor.handle(&req).await.unwrap();

        let notification = store
            .find_by_idempotency_key(&req.request_id.to_string())
            .await
            .unwrap()
            .unwrap();
        let attempts = store
            .delivery_attempts(notification.notification_id)
            .await
            .unwrap();
        let sms_attempt = attempts
            .iter()
            .find(|a| a.channel == DeliveryChannel::Sms)
            .unwrap();
        assert_eq!(sms_attempt.status, crate::models::DeliveryStatus::Skipped);
        assert_eq!(sms.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_sms_text_is_the_notification_body() {
        let store = InMemoryNotificationStore::new();
        let prefs = InMemoryPreferences::new();
        let sms = MockSmsSender::new();

        let mut profile = RecipientProfile::new(Uuid::new_v4(), UserRole::Customer);
        profile.phone_number = Some("+254712345678".to_string());
        let user_id = profile.user_id;
        prefs.upsert(profile).await;

        let processor = processor(store.clone(), prefs, sms.clone());
        let req = request(user_id);
        processor.handle(&req).await.unwrap();

        let sent = sms.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, req.body);
        assert_eq!(sent[0].to_number, "+254712345678");
    }

    #[tokio::test]
    async fn test_redelivery_sends_at_most_one_sms() {
        let store = InMemoryNotificationStore::new();
        let prefs = InMemoryPreferences::new();
        let sms = MockSmsSender::new();

        let mut profile = RecipientProfile::new(Uuid::new_v4(), UserRole::Customer);
        profile.phone_number = Some("+254712345678".to_string());
        let user_id = profile.user_id;
        prefs.upsert(profile).await;

        let processor = processor(store.clone(), prefs, sms.clone());
        let req = request(user_id);

        processor.handle(&req).await.unwrap();
        processor.handle(&req).await.unwrap();
        processor.handle(&req).await.unwrap();

        assert_eq!(store.notification_count().await, 1);
        assert_eq!(sms.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_error_mapping_categories() {
        let transient = to_stream_error(NotificationError::DatabaseError("down".to_string()));
        assert_eq!(transient.category(), ErrorCategory::Transient);

        let transient =
            to_stream_error(NotificationError::PreferencesUnavailable("down".to_string()));
        assert_eq!(transient.category(), ErrorCategory::Transient);

        let permanent = to_stream_error(NotificationError::Validation("bad".to_string()));
        assert_eq!(permanent.category(), ErrorCategory::Permanent);
    }
}
