//! PostgreSQL implementation of the notification store using SeaORM.

use super::NotificationStore;
use crate::error::{NotificationError, NotificationResult};
use crate::models::{
    DeliveryAttempt, DeliveryChannel, DeliveryStatus, Notification, NotificationType,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DbBackend, FromQueryResult, Statement};
use std::str::FromStr;
use uuid::Uuid;

/// PostgreSQL implementation of [`NotificationStore`].
#[derive(Clone)]
pub struct PostgresNotificationStore {
    db: sea_orm::DatabaseConnection,
}

impl PostgresNotificationStore {
    pub fn new(db: sea_orm::DatabaseConnection) -> Self {
        Self { db }
    }
}

/// Helper struct for deserializing notification rows from the database
#[derive(Debug, FromQueryResult)]
struct NotificationRow {
    notification_id: Uuid,
    user_id: Uuid,
    notification_type: String,
    title: String,
    body: String,
    sms_effective: bool,
    related_id: Option<Uuid>,
    idempotency_key: String,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = NotificationError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let notification_type =
            NotificationType::from_str(&row.notification_type).map_err(|_| {
                NotificationError::Internal(format!(
                    "Unknown notification type in database: {}",
                    row.notification_type
                ))
            })?;

        Ok(Notification {
            notification_id: row.notification_id,
            user_id: row.user_id,
            notification_type,
            title: row.title,
            body: row.body,
            sms_effective: row.sms_effective,
            related_id: row.related_id,
            idempotency_key: row.idempotency_key,
            read_at: row.read_at,
            created_at: row.created_at,
        })
    }
}

/// Helper struct for deserializing delivery attempt rows
#[derive(Debug, FromQueryResult)]
struct AttemptRow {
    attempt_id: Uuid,
    notification_id: Uuid,
    channel: String,
    status: String,
    provider_reference: Option<String>,
    detail: Option<String>,
    attempted_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for DeliveryAttempt {
    type Error = NotificationError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let channel = DeliveryChannel::from_str(&row.channel).map_err(|_| {
            NotificationError::Internal(format!("Unknown delivery channel: {}", row.channel))
        })?;
        let status = DeliveryStatus::from_str(&row.status).map_err(|_| {
            NotificationError::Internal(format!("Unknown delivery status: {}", row.status))
        })?;

        Ok(DeliveryAttempt {
            attempt_id: row.attempt_id,
            notification_id: row.notification_id,
            channel,
            status,
            provider_reference: row.provider_reference,
            detail: row.detail,
            attempted_at: row.attempted_at,
        })
    }
}

#[derive(Debug, FromQueryResult)]
struct CountRow {
    count: i64,
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    async fn create_notification(
        &self,
        notification: Notification,
    ) -> NotificationResult<(Notification, bool)> {
        let sql = r#"
            INSERT INTO notifications
                (notification_id, user_id, notification_type, title, body,
                 sms_effective, related_id, idempotency_key, read_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING *
        "#;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            [
                notification.notification_id.into(),
                notification.user_id.into(),
                notification.notification_type.to_string().into(),
                notification.title.clone().into(),
                notification.body.clone().into(),
                notification.sms_effective.into(),
                notification.related_id.into(),
                notification.idempotency_key.clone().into(),
                notification.read_at.into(),
                notification.created_at.into(),
            ],
        );

        let inserted = NotificationRow::find_by_statement(stmt)
            .one(&self.db)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        if let Some(row) = inserted {
            return Ok((row.try_into()?, true));
        }

        // Conflict: a row with this idempotency key already exists
        let existing = self
            .find_by_idempotency_key(&notification.idempotency_key)
            .await?
            .ok_or_else(|| {
                NotificationError::Internal(
                    "Notification conflicted on idempotency key but could not be read back"
                        .to_string(),
                )
            })?;

        Ok((existing, false))
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> NotificationResult<Option<Notification>> {
        let sql = "SELECT * FROM notifications WHERE idempotency_key = $1";
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, [key.into()]);

        let row = NotificationRow::find_by_statement(stmt)
            .one(&self.db)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: u64,
        offset: u64,
    ) -> NotificationResult<Vec<Notification>> {
        let sql = r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND ($2 = FALSE OR read_at IS NULL)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
        "#;
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            [
                user_id.into(),
                unread_only.into(),
                (limit as i64).into(),
                (offset as i64).into(),
            ],
        );

        let rows = NotificationRow::find_by_statement(stmt)
            .all(&self.db)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn unread_count(&self, user_id: Uuid) -> NotificationResult<u64> {
        let sql = r#"
            SELECT COUNT(*) AS count FROM notifications
            WHERE user_id = $1 AND read_at IS NULL
        "#;
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, [user_id.into()]);

        let row = CountRow::find_by_statement(stmt)
            .one(&self.db)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?
            .ok_or_else(|| NotificationError::Internal("COUNT returned no row".to_string()))?;

        Ok(row.count.max(0) as u64)
    }

    async fn mark_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> NotificationResult<Notification> {
        let sql = "SELECT * FROM notifications WHERE notification_id = $1";
        let stmt =
            Statement::from_sql_and_values(DbBackend::Postgres, sql, [notification_id.into()]);

        let row = NotificationRow::find_by_statement(stmt)
            .one(&self.db)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?
            .ok_or(NotificationError::NotificationNotFound(notification_id))?;

        if row.user_id != user_id {
            return Err(NotificationError::Forbidden {
                user_id,
                notification_id,
            });
        }

        // COALESCE keeps the original read_at on repeated calls
        let sql = r#"
            UPDATE notifications
            SET read_at = COALESCE(read_at, NOW())
            WHERE notification_id = $1
            RETURNING *
        "#;
        let stmt =
            Statement::from_sql_and_values(DbBackend::Postgres, sql, [notification_id.into()]);

        let row = NotificationRow::find_by_statement(stmt)
            .one(&self.db)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?
            .ok_or(NotificationError::NotificationNotFound(notification_id))?;

        row.try_into()
    }

    async fn record_delivery_attempt(
        &self,
        attempt: DeliveryAttempt,
    ) -> NotificationResult<bool> {
        let sql = r#"
            INSERT INTO delivery_attempts
                (attempt_id, notification_id, channel, status,
                 provider_reference, detail, attempted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (notification_id, channel) DO NOTHING
        "#;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            [
                attempt.attempt_id.into(),
                attempt.notification_id.into(),
                attempt.channel.to_string().into(),
                attempt.status.to_string().into(),
                attempt.provider_reference.clone().into(),
                attempt.detail.clone().into(),
                attempt.attempted_at.into(),
            ],
        );

        let result = self.db.execute_raw(stmt).await.map_err(|e| {
            let err_str = e.to_string();
            if err_str.contains("foreign key") {
                NotificationError::NotificationNotFound(attempt.notification_id)
            } else {
                NotificationError::DatabaseError(err_str)
            }
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn delivery_attempts(
        &self,
        notification_id: Uuid,
    ) -> NotificationResult<Vec<DeliveryAttempt>> {
        let sql = r#"
            SELECT * FROM delivery_attempts
            WHERE notification_id = $1
            ORDER BY attempted_at ASC
        "#;
        let stmt =
            Statement::from_sql_and_values(DbBackend::Postgres, sql, [notification_id.into()]);

        let rows = AttemptRow::find_by_statement(stmt)
            .all(&self.db)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
