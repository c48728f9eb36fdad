//! Notification persistence
//!
//! Every query is scoped to the owning user, so a foreign id behaves like a
//! missing one.

use sqlx::{FromRow, SqlitePool};
use uc_common::db::models::Notification;
use uc_common::{Error, Result};
use uuid::Uuid;

pub async fn insert_notification(pool: &SqlitePool, notification: &Notification) -> Result<()> {
    let data = notification
        .data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to encode notification data: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO notifications (id, user_id, type, title, message, data, read, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(notification.id.to_string())
    .bind(notification.user_id.to_string())
    .bind(notification.notification_type.as_str())
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(data)
    .bind(notification.read)
    .bind(notification.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Newest first
pub async fn list_notifications(
    pool: &SqlitePool,
    user_id: Uuid,
    unread_only: bool,
    limit: i64,
) -> Result<Vec<Notification>> {
    let sql = if unread_only {
        "SELECT id, user_id, type, title, message, data, read, created_at FROM notifications \
         WHERE user_id = ? AND read = 0 ORDER BY created_at DESC LIMIT ?"
    } else {
        "SELECT id, user_id, type, title, message, data, read, created_at FROM notifications \
         WHERE user_id = ? ORDER BY created_at DESC LIMIT ?"
    };

    let rows = sqlx::query(sql)
        .bind(user_id.to_string())
        .bind(limit)
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|r| Notification::from_row(r).map_err(Error::from))
        .collect()
}

/// Returns false when the notification does not exist for this user
pub async fn mark_read(pool: &SqlitePool, id: Uuid, user_id: Uuid) -> Result<bool> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND user_id = ?")
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_all_read(pool: &SqlitePool, user_id: Uuid) -> Result<u64> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE user_id = ? AND read = 0")
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Returns false when the notification does not exist for this user
pub async fn delete_notification(pool: &SqlitePool, id: Uuid, user_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
