//! Recipient preference lookup.

use crate::error::{NotificationError, NotificationResult};
use crate::models::{RecipientProfile, UserRole};
use async_trait::async_trait;
use sea_orm::{DatabaseConnection, DbBackend, FromQueryResult, Statement};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Read access to recipient profiles and notification preferences.
#[async_trait]
pub trait PreferencesReader: Send + Sync {
    /// Fetch the profile for a user.
    ///
    /// Returns [`NotificationError::UserNotFound`] when the user does not
    /// exist, [`NotificationError::UserInactive`] when the account is
    /// deactivated, and [`NotificationError::PreferencesUnavailable`] when
    /// the lookup fails operationally.
    async fn profile(&self, user_id: Uuid) -> NotificationResult<RecipientProfile>;
}

/// In-memory preference source for tests and local development.
#[derive(Clone, Default)]
pub struct InMemoryPreferences {
    profiles: Arc<RwLock<HashMap<Uuid, RecipientProfile>>>,
}

impl InMemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile.
    pub async fn upsert(&self, profile: RecipientProfile) {
        self.profiles.write().await.insert(profile.user_id, profile);
    }

    /// Remove a profile, simulating a deleted user.
    pub async fn remove(&self, user_id: Uuid) {
        self.profiles.write().await.remove(&user_id);
    }
}

#[async_trait]
impl PreferencesReader for InMemoryPreferences {
    async fn profile(&self, user_id: Uuid) -> NotificationResult<RecipientProfile> {
        let profile = self
            .profiles
            .read()
            .await
            .get(&user_id)
            .cloned()
            .ok_or(NotificationError::UserNotFound(user_id))?;

        if !profile.is_active {
            return Err(NotificationError::UserInactive(user_id));
        }
        Ok(profile)
    }
}

/// PostgreSQL-backed preference source.
///
/// Reads the users table joined with per-user notification preferences.
pub struct PostgresPreferences {
    db: DatabaseConnection,
}

#[derive(Debug, FromQueryResult)]
struct ProfileRow {
    user_id: Uuid,
    role: String,
    phone_number: Option<String>,
    is_active: bool,
    sms_notifications: bool,
    order_updates: bool,
    weather_alerts: bool,
    price_alerts: bool,
    marketing_notifications: bool,
}

impl PostgresPreferences {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn parse_role(role: &str) -> UserRole {
        match role {
            "farmer" => UserRole::Farmer,
            "rider" => UserRole::Rider,
            "admin" => UserRole::Admin,
            _ => UserRole::Customer,
        }
    }
}

#[async_trait]
impl PreferencesReader for PostgresPreferences {
    async fn profile(&self, user_id: Uuid) -> NotificationResult<RecipientProfile> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                u.id AS user_id,
                u.role,
                u.phone_number,
                u.is_active,
                COALESCE(p.sms_notifications, TRUE) AS sms_notifications,
                COALESCE(p.order_updates, TRUE) AS order_updates,
                COALESCE(p.weather_alerts, TRUE) AS weather_alerts,
                COALESCE(p.price_alerts, TRUE) AS price_alerts,
                COALESCE(p.marketing_notifications, FALSE) AS marketing_notifications
            FROM users u
            LEFT JOIN notification_preferences p ON p.user_id = u.id
            WHERE u.id = $1
            "#,
            [user_id.into()],
        );

        let row = ProfileRow::find_by_statement(stmt)
            .one(&self.db)
            .await
            .map_err(|e| NotificationError::PreferencesUnavailable(e.to_string()))?
            .ok_or(NotificationError::UserNotFound(user_id))?;

        if !row.is_active {
            return Err(NotificationError::UserInactive(user_id));
        }

        Ok(RecipientProfile {
            user_id: row.user_id,
            role: Self::parse_role(&row.role),
            phone_number: row.phone_number,
            is_active: row.is_active,
            sms_notifications: row.sms_notifications,
            order_updates: row.order_updates,
            weather_alerts: row.weather_alerts,
            price_alerts: row.price_alerts,
            marketing_notifications: row.marketing_notifications,
        })
    }
}
