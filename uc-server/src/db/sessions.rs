//! Session persistence
//!
//! Only the SHA-256 digest of a bearer token is stored.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uc_common::db::models::Session;
use uc_common::Result;
use uuid::Uuid;

pub async fn create_session(
    pool: &SqlitePool,
    user_id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<Session> {
    let session = Session {
        id: Uuid::new_v4(),
        user_id,
        expires_at,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(session.id.to_string())
    .bind(user_id.to_string())
    .bind(token_hash)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(pool)
    .await?;

    Ok(session)
}

pub async fn find_by_token_hash(pool: &SqlitePool, token_hash: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        "SELECT id, user_id, expires_at, created_at FROM sessions WHERE token_hash = ?",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| Session::from_row(&r)).transpose()?)
}

pub async fn extend_session(pool: &SqlitePool, id: Uuid, expires_at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE sessions SET expires_at = ? WHERE id = ?")
        .bind(expires_at)
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_session(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove every session that expired before `now`; returns the count
pub async fn delete_expired(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
