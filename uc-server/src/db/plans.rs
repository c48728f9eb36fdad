//! Training plan and phase persistence

use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use uc_common::db::models::{PlanPhase, Role, TrainingPlan};
use uc_common::{Error, Result};
use uuid::Uuid;

const PLAN_COLUMNS: &str = "id, title, description, coach_id, runner_id, target_race_id, \
     goal_type, plan_type, start_date, end_date, archived, created_at, updated_at";

pub async fn insert_plan(pool: &SqlitePool, plan: &TrainingPlan) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO training_plans
            (id, title, description, coach_id, runner_id, target_race_id, goal_type, plan_type,
             start_date, end_date, archived, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(plan.id.to_string())
    .bind(&plan.title)
    .bind(&plan.description)
    .bind(plan.coach_id.to_string())
    .bind(plan.runner_id.to_string())
    .bind(plan.target_race_id.map(|id| id.to_string()))
    .bind(plan.goal_type.as_str())
    .bind(plan.plan_type.as_str())
    .bind(plan.start_date)
    .bind(plan.end_date)
    .bind(plan.archived)
    .bind(plan.created_at)
    .bind(plan.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_plan(pool: &SqlitePool, id: Uuid) -> Result<Option<TrainingPlan>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM training_plans WHERE id = ?",
        PLAN_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| TrainingPlan::from_row(&r)).transpose()?)
}

pub async fn require_plan(pool: &SqlitePool, id: Uuid) -> Result<TrainingPlan> {
    get_plan(pool, id)
        .await?
        .ok_or_else(|| Error::not_found("Training plan", id))
}

/// Plans of a runner whose coach still has an active relationship with them
pub async fn active_plan_ids(pool: &SqlitePool, runner_id: Uuid) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT tp.id FROM training_plans tp
        JOIN coach_runners cr
          ON cr.coach_id = tp.coach_id AND cr.runner_id = tp.runner_id
        WHERE tp.runner_id = ? AND cr.status = 'active'
        "#,
    )
    .bind(runner_id.to_string())
    .fetch_all(pool)
    .await?;

    ids.iter().map(|s| uc_common::uuid_utils::parse(s)).collect()
}

/// Plans the user coaches (coach) or follows (runner)
pub async fn list_plans(
    pool: &SqlitePool,
    user_id: Uuid,
    role: Role,
    archived: Option<bool>,
) -> Result<Vec<TrainingPlan>> {
    let owner_column = match role {
        Role::Coach => "coach_id",
        Role::Runner => "runner_id",
    };
    let mut sql = format!(
        "SELECT {} FROM training_plans WHERE {} = ?",
        PLAN_COLUMNS, owner_column
    );
    if archived.is_some() {
        sql.push_str(" AND archived = ?");
    }
    sql.push_str(" ORDER BY start_date DESC, title");

    let mut query = sqlx::query(&sql).bind(user_id.to_string());
    if let Some(archived) = archived {
        query = query.bind(archived);
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter()
        .map(|r| TrainingPlan::from_row(r).map_err(Error::from))
        .collect()
}

pub async fn update_plan(pool: &SqlitePool, plan: &TrainingPlan) -> Result<TrainingPlan> {
    sqlx::query(
        r#"
        UPDATE training_plans SET
            title = ?, description = ?, target_race_id = ?, goal_type = ?, plan_type = ?,
            start_date = ?, end_date = ?, archived = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&plan.title)
    .bind(&plan.description)
    .bind(plan.target_race_id.map(|id| id.to_string()))
    .bind(plan.goal_type.as_str())
    .bind(plan.plan_type.as_str())
    .bind(plan.start_date)
    .bind(plan.end_date)
    .bind(plan.archived)
    .bind(Utc::now())
    .bind(plan.id.to_string())
    .execute(pool)
    .await?;

    require_plan(pool, plan.id).await
}

/// Delete a plan; phases and workouts go with it (ON DELETE CASCADE)
pub async fn delete_plan(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM training_plans WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

// ========================================
// Phases
// ========================================

pub async fn list_phases(pool: &SqlitePool, plan_id: Uuid) -> Result<Vec<PlanPhase>> {
    let rows = sqlx::query(
        r#"
        SELECT id, training_plan_id, phase, phase_order, start_date, end_date
        FROM plan_phases WHERE training_plan_id = ? ORDER BY phase_order
        "#,
    )
    .bind(plan_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| PlanPhase::from_row(r).map_err(Error::from))
        .collect()
}

/// Replace the phases of a plan atomically
pub async fn replace_phases(pool: &SqlitePool, plan_id: Uuid, phases: &[PlanPhase]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM plan_phases WHERE training_plan_id = ?")
        .bind(plan_id.to_string())
        .execute(&mut *tx)
        .await?;

    for phase in phases {
        sqlx::query(
            r#"
            INSERT INTO plan_phases (id, training_plan_id, phase, phase_order, start_date, end_date)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(phase.id.to_string())
        .bind(plan_id.to_string())
        .bind(phase.phase.as_str())
        .bind(phase.phase_order)
        .bind(phase.start_date)
        .bind(phase.end_date)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
