//! Message persistence and conversation queries

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Row, SqlitePool};
use uc_common::db::models::Message;
use uc_common::{Error, Result};
use uuid::Uuid;

const MESSAGE_COLUMNS: &str =
    "id, sender_id, recipient_id, content, workout_id, context_type, read, created_at";

/// Latest exchange with one partner
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub partner_id: Uuid,
    pub last_message: Message,
    pub unread_count: i64,
}

pub async fn insert_message(pool: &SqlitePool, message: &Message) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO messages (id, sender_id, recipient_id, content, workout_id, context_type, read, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(message.id.to_string())
    .bind(message.sender_id.to_string())
    .bind(message.recipient_id.to_string())
    .bind(&message.content)
    .bind(message.workout_id.map(|id| id.to_string()))
    .bind(message.context_type.as_str())
    .bind(message.read)
    .bind(message.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// The newest `limit` messages between two users older than `before`, oldest first
pub async fn conversation(
    pool: &SqlitePool,
    user_id: Uuid,
    partner_id: Uuid,
    before: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<Message>> {
    let mut sql = format!(
        r#"
        SELECT {} FROM messages
        WHERE ((sender_id = ? AND recipient_id = ?) OR (sender_id = ? AND recipient_id = ?))
        "#,
        MESSAGE_COLUMNS
    );
    if before.is_some() {
        sql.push_str(" AND created_at < ?");
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT ?");

    let mut query = sqlx::query(&sql)
        .bind(user_id.to_string())
        .bind(partner_id.to_string())
        .bind(partner_id.to_string())
        .bind(user_id.to_string());
    if let Some(before) = before {
        query = query.bind(before);
    }
    let rows = query.bind(limit).fetch_all(pool).await?;

    let mut messages = rows
        .iter()
        .map(|r| Message::from_row(r).map_err(Error::from))
        .collect::<Result<Vec<_>>>()?;
    messages.reverse();
    Ok(messages)
}

/// Mark everything `partner_id` sent to `reader_id` as read; returns the count
pub async fn mark_read(pool: &SqlitePool, reader_id: Uuid, partner_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE messages SET read = 1 WHERE recipient_id = ? AND sender_id = ? AND read = 0",
    )
    .bind(reader_id.to_string())
    .bind(partner_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// One summary per conversation partner, most recent first
pub async fn conversations(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<ConversationSummary>> {
    let partners = sqlx::query(
        r#"
        SELECT CASE WHEN sender_id = ? THEN recipient_id ELSE sender_id END AS partner_id,
               MAX(created_at) AS last_at
        FROM messages
        WHERE sender_id = ? OR recipient_id = ?
        GROUP BY partner_id
        ORDER BY last_at DESC
        "#,
    )
    .bind(user_id.to_string())
    .bind(user_id.to_string())
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut summaries = Vec::with_capacity(partners.len());
    for row in partners {
        let partner: String = row.try_get("partner_id")?;
        let partner_id = uc_common::uuid_utils::parse(&partner)?;

        let Some(last_message) = conversation(pool, user_id, partner_id, None, 1)
            .await?
            .pop()
        else {
            continue;
        };

        let unread_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE recipient_id = ? AND sender_id = ? AND read = 0",
        )
        .bind(user_id.to_string())
        .bind(partner_id.to_string())
        .fetch_one(pool)
        .await?;

        summaries.push(ConversationSummary {
            partner_id,
            last_message,
            unread_count,
        });
    }

    Ok(summaries)
}
