//! In-memory store for tests and local development.

use super::NotificationStore;
use crate::error::{NotificationError, NotificationResult};
use crate::models::{DeliveryAttempt, Notification};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    notifications: HashMap<Uuid, Notification>,
    by_idempotency_key: HashMap<String, Uuid>,
    attempts: HashMap<Uuid, Vec<DeliveryAttempt>>,
}

/// In-memory implementation of [`NotificationStore`].
#[derive(Clone, Default)]
pub struct InMemoryNotificationStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored notifications, for test assertions.
    pub async fn notification_count(&self) -> usize {
        self.inner.read().await.notifications.len()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn create_notification(
        &self,
        notification: Notification,
    ) -> NotificationResult<(Notification, bool)> {
        let mut inner = self.inner.write().await;

        if let Some(existing_id) = inner.by_idempotency_key.get(&notification.idempotency_key)
            && let Some(existing) = inner.notifications.get(existing_id)
        {
            return Ok((existing.clone(), false));
        }

        inner
            .by_idempotency_key
            .insert(notification.idempotency_key.clone(), notification.notification_id);
        inner
            .notifications
            .insert(notification.notification_id, notification.clone());

        Ok((notification, true))
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> NotificationResult<Option<Notification>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_idempotency_key
            .get(key)
            .and_then(|id| inner.notifications.get(id))
            .cloned())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: u64,
        offset: u64,
    ) -> NotificationResult<Vec<Notification>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && (!unread_only || n.read_at.is_none()))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn unread_count(&self, user_id: Uuid) -> NotificationResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && n.read_at.is_none())
            .count() as u64)
    }

    async fn mark_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> NotificationResult<Notification> {
        let mut inner = self.inner.write().await;

        let notification = inner
            .notifications
            .get_mut(&notification_id)
            .ok_or(NotificationError::NotificationNotFound(notification_id))?;

        if notification.user_id != user_id {
            return Err(NotificationError::Forbidden {
                user_id,
                notification_id,
            });
        }

        if notification.read_at.is_none() {
            notification.read_at = Some(Utc::now());
        }

        Ok(notification.clone())
    }

    async fn record_delivery_attempt(
        &self,
        attempt: DeliveryAttempt,
    ) -> NotificationResult<bool> {
        let mut inner = self.inner.write().await;

        if !inner.notifications.contains_key(&attempt.notification_id) {
            return Err(NotificationError::NotificationNotFound(
                attempt.notification_id,
            ));
        }

        let attempts = inner.attempts.entry(attempt.notification_id).or_default();
        if attempts.iter().any(|a| a.channel == attempt.channel) {
            return Ok(false);
        }

        attempts.push(attempt);
        Ok(true)
    }

    async fn delivery_attempts(
        &self,
        notification_id: Uuid,
    ) -> NotificationResult<Vec<DeliveryAttempt>> {
        let inner = self.inner.read().await;
        Ok(inner
            .attempts
            .get(&notification_id)
            .cloned()
            .unwrap_or_default())
    }
}
