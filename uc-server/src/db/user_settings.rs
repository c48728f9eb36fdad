//! Per-user preferences

use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use uc_common::db::models::{NotificationPreferences, UserSettings};
use uc_common::{Error, Result};
use uuid::Uuid;

/// Create the default settings row for a new user (no-op if present)
pub async fn create_default(pool: &SqlitePool, user_id: Uuid) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO user_settings (user_id, units, notification_preferences, updated_at) VALUES (?, 'imperial', '{}', ?)",
    )
    .bind(user_id.to_string())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Settings of a user; a missing row is created with defaults first
pub async fn get_settings(pool: &SqlitePool, user_id: Uuid) -> Result<UserSettings> {
    create_default(pool, user_id).await?;

    let row = sqlx::query(
        "SELECT user_id, units, notification_preferences, updated_at FROM user_settings WHERE user_id = ?",
    )
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(UserSettings::from_row(&row)?)
}

/// Notification switches only (used on every notification write)
pub async fn get_preferences(pool: &SqlitePool, user_id: Uuid) -> Result<NotificationPreferences> {
    let raw: Option<String> =
        sqlx::query_scalar("SELECT notification_preferences FROM user_settings WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(pool)
            .await?;

    match raw {
        Some(json) => serde_json::from_str(&json).map_err(|e| {
            Error::Internal(format!("Corrupt notification preferences for {}: {}", user_id, e))
        }),
        None => Ok(NotificationPreferences::default()),
    }
}

pub async fn update_settings(pool: &SqlitePool, settings: &UserSettings) -> Result<UserSettings> {
    let preferences = serde_json::to_string(&settings.notification_preferences)
        .map_err(|e| Error::Internal(format!("Failed to encode preferences: {}", e)))?;

    create_default(pool, settings.user_id).await?;
    sqlx::query(
        "UPDATE user_settings SET units = ?, notification_preferences = ?, updated_at = ? WHERE user_id = ?",
    )
    .bind(settings.units.as_str())
    .bind(preferences)
    .bind(Utc::now())
    .bind(settings.user_id.to_string())
    .execute(pool)
    .await?;

    get_settings(pool, settings.user_id).await
}
