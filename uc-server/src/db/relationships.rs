//! Coach/runner relationship persistence (`coach_runners`)

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uc_common::db::models::{CoachRunner, RelationshipStatus, Role, User};
use uc_common::{Error, Result};
use uuid::Uuid;

use super::unique_violation;

const RELATIONSHIP_COLUMNS: &str = "id, coach_id, runner_id, status, relationship_type, invited_by, \
     notes, started_at, ended_at, created_at, updated_at";

/// Insert a relationship; an open pair already present is a `Conflict`
pub async fn insert_relationship(pool: &SqlitePool, rel: &CoachRunner) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO coach_runners
            (id, coach_id, runner_id, status, relationship_type, invited_by, notes,
             started_at, ended_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(rel.id.to_string())
    .bind(rel.coach_id.to_string())
    .bind(rel.runner_id.to_string())
    .bind(rel.status.as_str())
    .bind(rel.relationship_type.as_str())
    .bind(rel.invited_by.as_str())
    .bind(&rel.notes)
    .bind(rel.started_at)
    .bind(rel.ended_at)
    .bind(rel.created_at)
    .bind(rel.updated_at)
    .execute(pool)
    .await
    .map_err(|e| unique_violation(e, "A pending or active relationship already exists"))?;

    Ok(())
}

pub async fn get_relationship(pool: &SqlitePool, id: Uuid) -> Result<Option<CoachRunner>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM coach_runners WHERE id = ?",
        RELATIONSHIP_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| CoachRunner::from_row(&r)).transpose()?)
}

/// The pending or active relationship of a pair, if any
pub async fn find_open_pair(
    pool: &SqlitePool,
    coach_id: Uuid,
    runner_id: Uuid,
) -> Result<Option<CoachRunner>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM coach_runners WHERE coach_id = ? AND runner_id = ? AND status IN ('pending', 'active')",
        RELATIONSHIP_COLUMNS
    ))
    .bind(coach_id.to_string())
    .bind(runner_id.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| CoachRunner::from_row(&r)).transpose()?)
}

/// The active relationship between two users in either role direction
pub async fn find_active_between(
    pool: &SqlitePool,
    a: Uuid,
    b: Uuid,
) -> Result<Option<CoachRunner>> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {} FROM coach_runners
        WHERE status = 'active'
          AND ((coach_id = ? AND runner_id = ?) OR (coach_id = ? AND runner_id = ?))
        "#,
        RELATIONSHIP_COLUMNS
    ))
    .bind(a.to_string())
    .bind(b.to_string())
    .bind(b.to_string())
    .bind(a.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| CoachRunner::from_row(&r)).transpose()?)
}

/// Fail with `Forbidden` unless `coach_id` actively coaches `runner_id`
///
/// Guards every plan, workout-write and message operation.
pub async fn require_active_relationship(
    pool: &SqlitePool,
    coach_id: Uuid,
    runner_id: Uuid,
) -> Result<CoachRunner> {
    match find_open_pair(pool, coach_id, runner_id).await? {
        Some(rel) if rel.status == RelationshipStatus::Active => Ok(rel),
        _ => Err(Error::Forbidden(
            "No active coaching relationship with this runner".to_string(),
        )),
    }
}

pub async fn update_status(
    pool: &SqlitePool,
    id: Uuid,
    status: RelationshipStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
) -> Result<CoachRunner> {
    sqlx::query(
        "UPDATE coach_runners SET status = ?, started_at = ?, ended_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(started_at)
    .bind(ended_at)
    .bind(Utc::now())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    get_relationship(pool, id)
        .await?
        .ok_or_else(|| Error::not_found("Relationship", id))
}

/// Relationships the user takes part in, newest first
pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: Uuid,
    status: Option<RelationshipStatus>,
) -> Result<Vec<CoachRunner>> {
    let mut sql = format!(
        "SELECT {} FROM coach_runners WHERE (coach_id = ? OR runner_id = ?)",
        RELATIONSHIP_COLUMNS
    );
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut query = sqlx::query(&sql)
        .bind(user_id.to_string())
        .bind(user_id.to_string());
    if let Some(status) = status {
        query = query.bind(status.as_str());
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter()
        .map(|r| CoachRunner::from_row(r).map_err(Error::from))
        .collect()
}

/// Runners a coach currently coaches
pub async fn active_runner_ids(pool: &SqlitePool, coach_id: Uuid) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT runner_id FROM coach_runners WHERE coach_id = ? AND status = 'active'",
    )
    .bind(coach_id.to_string())
    .fetch_all(pool)
    .await?;

    ids.iter().map(|s| uc_common::uuid_utils::parse(s)).collect()
}

/// Users of the opposite role with no pending or active relationship with `user`
pub async fn available_partners(pool: &SqlitePool, user: &User) -> Result<Vec<User>> {
    // The caller's column and the partner's column in coach_runners
    let (own_column, partner_column) = match user.role {
        Role::Coach => ("coach_id", "runner_id"),
        Role::Runner => ("runner_id", "coach_id"),
    };

    let sql = format!(
        r#"
        SELECT u.id, u.email, u.name, u.role, u.created_at, u.updated_at
        FROM users u
        WHERE u.role = ?
          AND NOT EXISTS (
              SELECT 1 FROM coach_runners cr
              WHERE cr.{own} = ? AND cr.{partner} = u.id
                AND cr.status IN ('pending', 'active')
          )
        ORDER BY u.name
        "#,
        own = own_column,
        partner = partner_column
    );

    let rows = sqlx::query(&sql)
        .bind(user.role.counterpart().as_str())
        .bind(user.id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|r| User::from_row(r).map_err(Error::from))
        .collect()
}
