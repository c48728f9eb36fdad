//! Workout persistence

use chrono::NaiveDate;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use uc_common::db::models::Workout;
use uc_common::{Error, Result};
use uuid::Uuid;

use super::unique_violation;

const WORKOUT_COLUMNS: &str = "id, training_plan_id, runner_id, date, category, planned_distance, \
     planned_duration, intensity, terrain, elevation_gain, status, actual_type, actual_distance, \
     actual_duration, workout_notes, injury_notes, external_id, source, created_at, updated_at";

/// Selection for workout listings; empty `runner_ids` selects nothing
#[derive(Debug, Clone, Default)]
pub struct WorkoutFilter {
    pub runner_ids: Vec<Uuid>,
    pub plan_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub async fn insert_workout<'e, E>(executor: E, workout: &Workout) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO workouts
            (id, training_plan_id, runner_id, date, category, planned_distance, planned_duration,
             intensity, terrain, elevation_gain, status, actual_type, actual_distance,
             actual_duration, workout_notes, injury_notes, external_id, source, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(workout.id.to_string())
    .bind(workout.training_plan_id.map(|id| id.to_string()))
    .bind(workout.runner_id.to_string())
    .bind(workout.date)
    .bind(workout.category.as_str())
    .bind(workout.planned_distance)
    .bind(workout.planned_duration)
    .bind(workout.intensity)
    .bind(workout.terrain.map(|t| t.as_str()))
    .bind(workout.elevation_gain)
    .bind(workout.status.as_str())
    .bind(&workout.actual_type)
    .bind(workout.actual_distance)
    .bind(workout.actual_duration)
    .bind(&workout.workout_notes)
    .bind(&workout.injury_notes)
    .bind(&workout.external_id)
    .bind(workout.source.as_str())
    .bind(workout.created_at)
    .bind(workout.updated_at)
    .execute(executor)
    .await
    .map_err(|e| unique_violation(e, "Activity already imported for this runner"))?;

    Ok(())
}

/// Write back every mutable column of a workout
pub async fn update_workout<'e, E>(executor: E, workout: &Workout) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE workouts SET
            date = ?, category = ?, planned_distance = ?, planned_duration = ?, intensity = ?,
            terrain = ?, elevation_gain = ?, status = ?, actual_type = ?, actual_distance = ?,
            actual_duration = ?, workout_notes = ?, injury_notes = ?, external_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(workout.date)
    .bind(workout.category.as_str())
    .bind(workout.planned_distance)
    .bind(workout.planned_duration)
    .bind(workout.intensity)
    .bind(workout.terrain.map(|t| t.as_str()))
    .bind(workout.elevation_gain)
    .bind(workout.status.as_str())
    .bind(&workout.actual_type)
    .bind(workout.actual_distance)
    .bind(workout.actual_duration)
    .bind(&workout.workout_notes)
    .bind(&workout.injury_notes)
    .bind(&workout.external_id)
    .bind(workout.updated_at)
    .bind(workout.id.to_string())
    .execute(executor)
    .await
    .map_err(|e| unique_violation(e, "Activity already imported for this runner"))?;

    Ok(())
}

pub async fn get_workout(pool: &SqlitePool, id: Uuid) -> Result<Option<Workout>> {
    let row = sqlx::query(&format!("SELECT {} FROM workouts WHERE id = ?", WORKOUT_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| Workout::from_row(&r)).transpose()?)
}

pub async fn require_workout(pool: &SqlitePool, id: Uuid) -> Result<Workout> {
    get_workout(pool, id)
        .await?
        .ok_or_else(|| Error::not_found("Workout", id))
}

/// Workouts matching the filter, ordered by date
pub async fn list_workouts(pool: &SqlitePool, filter: &WorkoutFilter) -> Result<Vec<Workout>> {
    if filter.runner_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM workouts WHERE runner_id IN (", WORKOUT_COLUMNS));
    let mut ids = builder.separated(", ");
    for id in &filter.runner_ids {
        ids.push_bind(id.to_string());
    }
    ids.push_unseparated(")");

    if let Some(plan_id) = filter.plan_id {
        builder.push(" AND training_plan_id = ").push_bind(plan_id.to_string());
    }
    if let Some(from) = filter.from {
        builder.push(" AND date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND date <= ").push_bind(to);
    }
    builder.push(" ORDER BY date, created_at");

    let rows = builder.build().fetch_all(pool).await?;
    rows.iter()
        .map(|r| Workout::from_row(r).map_err(Error::from))
        .collect()
}

pub async fn delete_workout(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM workouts WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uc_common::auth::hash_password;
    use uc_common::db::init_memory_database;
    use uc_common::db::models::{Role, User, WorkoutCategory, WorkoutSource, WorkoutStatus};

    async fn runner(pool: &SqlitePool, email: &str) -> Uuid {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: email.to_string(),
            role: Role::Runner,
            created_at: now,
            updated_at: now,
        };
        crate::db::users::insert_user(pool, &user, &hash_password("password1"))
            .await
            .unwrap();
        user.id
    }

    fn workout(runner_id: Uuid, date: NaiveDate, external_id: Option<&str>) -> Workout {
        let now = Utc::now();
        Workout {
            id: Uuid::new_v4(),
            training_plan_id: None,
            runner_id,
            date,
            category: WorkoutCategory::Easy,
            planned_distance: None,
            planned_duration: None,
            intensity: None,
            terrain: None,
            elevation_gain: None,
            status: WorkoutStatus::Completed,
            actual_type: Some("Run".to_string()),
            actual_distance: Some(5.0),
            actual_duration: Some(45),
            workout_notes: None,
            injury_notes: None,
            external_id: external_id.map(str::to_string),
            source: WorkoutSource::Import,
            created_at: now,
            updated_at: now,
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[tokio::test]
    async fn test_external_id_unique_per_runner() {
        let pool = init_memory_database().await.unwrap();
        let alice = runner(&pool, "alice@example.com").await;
        let bob = runner(&pool, "bob@example.com").await;

        insert_workout(&pool, &workout(alice, date(1), Some("strava-1")))
            .await
            .unwrap();
        // Same id for a different runner is fine
        insert_workout(&pool, &workout(bob, date(1), Some("strava-1")))
            .await
            .unwrap();

        let err = insert_workout(&pool, &workout(alice, date(2), Some("strava-1")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_filters_by_runner_and_range() {
        let pool = init_memory_database().await.unwrap();
        let alice = runner(&pool, "alice@example.com").await;
        let bob = runner(&pool, "bob@example.com").await;
        for d in [1, 5, 9] {
            insert_workout(&pool, &workout(alice, date(d), None)).await.unwrap();
        }
        insert_workout(&pool, &workout(bob, date(5), None)).await.unwrap();

        let filter = WorkoutFilter {
            runner_ids: vec![alice],
            from: Some(date(2)),
            to: Some(date(9)),
            ..Default::default()
        };
        let found = list_workouts(&pool, &filter).await.unwrap();
        let dates: Vec<NaiveDate> = found.iter().map(|w| w.date).collect();
        assert_eq!(dates, vec![date(5), date(9)]);

        assert!(list_workouts(&pool, &WorkoutFilter::default())
            .await
            .unwrap()
            .is_empty());
    }
}
