//! Workout endpoints
//!
//! Coaches write the planned side of a workout, runners the actual side.
//! Every write needs an active relationship between the plan's coach and
//! the runner.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uc_common::db::models::{
    NotificationType, Role, TerrainType, Workout, WorkoutCategory, WorkoutSource, WorkoutStatus,
};
use uc_common::events::UcEvent;
use uc_common::time::today;
use uc_import::{Activity, ReconcileDecision};
use uuid::Uuid;

use crate::api::AuthUser;
use crate::db;
use crate::db::workouts::WorkoutFilter;
use crate::error::{ApiError, ApiResult};
use crate::services::training::{self, WeekSummary, DEFAULT_SUMMARY_WEEKS};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListWorkoutsQuery {
    pub runner_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkoutRequest {
    pub training_plan_id: Option<Uuid>,
    pub date: NaiveDate,
    pub category: WorkoutCategory,
    pub planned_distance: Option<f64>,
    pub planned_duration: Option<i64>,
    pub intensity: Option<i64>,
    pub terrain: Option<TerrainType>,
    pub elevation_gain: Option<f64>,
    pub actual_type: Option<String>,
    pub actual_distance: Option<f64>,
    pub actual_duration: Option<i64>,
    pub workout_notes: Option<String>,
}

/// Partial workout update
///
/// Planned fields belong to the coach, actual fields and notes to the runner.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateWorkoutRequest {
    pub date: Option<NaiveDate>,
    pub category: Option<WorkoutCategory>,
    pub planned_distance: Option<f64>,
    pub planned_duration: Option<i64>,
    pub intensity: Option<i64>,
    pub terrain: Option<TerrainType>,
    pub elevation_gain: Option<f64>,
    pub actual_type: Option<String>,
    pub actual_distance: Option<f64>,
    pub actual_duration: Option<i64>,
    pub workout_notes: Option<String>,
    pub injury_notes: Option<String>,
}

impl UpdateWorkoutRequest {
    fn touches_planned(&self) -> bool {
        self.date.is_some()
            || self.category.is_some()
            || self.planned_distance.is_some()
            || self.planned_duration.is_some()
            || self.intensity.is_some()
            || self.terrain.is_some()
            || self.elevation_gain.is_some()
    }

    fn touches_actual(&self) -> bool {
        self.actual_type.is_some()
            || self.actual_distance.is_some()
            || self.actual_duration.is_some()
            || self.workout_notes.is_some()
            || self.injury_notes.is_some()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteWorkoutRequest {
    pub actual_distance: Option<f64>,
    pub actual_duration: Option<i64>,
    pub actual_type: Option<String>,
    pub workout_notes: Option<String>,
    pub injury_notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SkipWorkoutRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportActivitiesRequest {
    pub activities: Vec<Activity>,
}

#[derive(Debug, Serialize)]
pub struct ImportActivitiesResponse {
    pub matched: usize,
    pub created: usize,
    pub skipped: usize,
    pub decisions: Vec<ReconcileDecision>,
}

#[derive(Debug, Deserialize)]
pub struct WeeklySummaryQuery {
    pub runner_id: Option<Uuid>,
    pub weeks: Option<i64>,
}

// ========================================
// Validation and access
// ========================================

/// Range checks shared by create and update
pub fn validate_metrics(
    intensity: Option<i64>,
    distances: &[Option<f64>],
    durations: &[Option<i64>],
) -> ApiResult<()> {
    if let Some(i) = intensity {
        if !(1..=10).contains(&i) {
            return Err(ApiError::BadRequest(
                "intensity must be between 1 and 10".to_string(),
            ));
        }
    }
    if distances.iter().flatten().any(|d| !d.is_finite() || *d < 0.0) {
        return Err(ApiError::BadRequest(
            "distances must not be negative".to_string(),
        ));
    }
    if durations.iter().flatten().any(|d| *d < 0) {
        return Err(ApiError::BadRequest(
            "durations must not be negative".to_string(),
        ));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Runners whose workouts the caller may read, optionally narrowed to one
async fn readable_runners(
    state: &AppState,
    auth: &AuthUser,
    runner_id: Option<Uuid>,
) -> ApiResult<Vec<Uuid>> {
    match auth.role() {
        Role::Runner => match runner_id {
            Some(id) if id != auth.id() => Err(ApiError::Forbidden(
                "Runners can only view their own workouts".to_string(),
            )),
            _ => Ok(vec![auth.id()]),
        },
        Role::Coach => match runner_id {
            Some(id) => {
                db::relationships::require_active_relationship(&state.db, auth.id(), id).await?;
                Ok(vec![id])
            }
            None => Ok(db::relationships::active_runner_ids(&state.db, auth.id()).await?),
        },
    }
}

/// Coach of the plan a workout belongs to
async fn plan_coach(state: &AppState, workout: &Workout) -> ApiResult<Option<Uuid>> {
    match workout.training_plan_id {
        Some(plan_id) => Ok(db::plans::get_plan(&state.db, plan_id)
            .await?
            .map(|plan| plan.coach_id)),
        None => Ok(None),
    }
}

/// Coach allowed to see this workout, checked against an active relationship
async fn active_coach(state: &AppState, workout: &Workout) -> ApiResult<Option<Uuid>> {
    let Some(coach_id) = plan_coach(state, workout).await? else {
        return Ok(None);
    };
    db::relationships::require_active_relationship(&state.db, coach_id, workout.runner_id).await?;
    Ok(Some(coach_id))
}

/// Workout the caller's role may write
///
/// Returns the workout and the coach of its plan.
async fn writable_workout(
    state: &AppState,
    auth: &AuthUser,
    id: Uuid,
) -> ApiResult<(Workout, Option<Uuid>)> {
    let workout = db::workouts::require_workout(&state.db, id).await?;
    let coach_id = plan_coach(state, &workout).await?;

    match auth.role() {
        Role::Runner if workout.runner_id == auth.id() => {}
        Role::Coach if coach_id == Some(auth.id()) => {}
        _ => {
            return Err(ApiError::Forbidden(
                "Not allowed to modify this workout".to_string(),
            ))
        }
    }
    let coach_id = match coach_id {
        Some(_) => active_coach(state, &workout).await?,
        None => None,
    };
    Ok((workout, coach_id))
}

// ========================================
// Handlers
// ========================================

/// GET /api/workouts
pub async fn list_workouts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListWorkoutsQuery>,
) -> ApiResult<Json<Vec<Workout>>> {
    let runner_ids = readable_runners(&state, &auth, query.runner_id).await?;
    let filter = WorkoutFilter {
        runner_ids,
        plan_id: query.plan_id,
        from: query.from,
        to: query.to,
    };
    Ok(Json(db::workouts::list_workouts(&state.db, &filter).await?))
}

/// GET /api/workouts/:id
pub async fn get_workout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Workout>> {
    let workout = db::workouts::require_workout(&state.db, id).await?;
    readable_runners(&state, &auth, Some(workout.runner_id)).await?;
    Ok(Json(workout))
}

/// POST /api/workouts
pub async fn create_workout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateWorkoutRequest>,
) -> ApiResult<(StatusCode, Json<Workout>)> {
    validate_metrics(
        req.intensity,
        &[req.planned_distance, req.actual_distance, req.elevation_gain],
        &[req.planned_duration, req.actual_duration],
    )?;

    let (runner_id, source, status) = match auth.role() {
        Role::Coach => {
            let plan_id = req.training_plan_id.ok_or_else(|| {
                ApiError::BadRequest("Coaches create workouts within a training plan".to_string())
            })?;
            let plan = db::plans::require_plan(&state.db, plan_id).await?;
            if plan.coach_id != auth.id() {
                return Err(ApiError::Forbidden(
                    "Only the plan's coach can add workouts".to_string(),
                ));
            }
            db::relationships::require_active_relationship(&state.db, auth.id(), plan.runner_id)
                .await?;
            (plan.runner_id, WorkoutSource::Planned, WorkoutStatus::Planned)
        }
        Role::Runner => {
            if req.training_plan_id.is_some() {
                return Err(ApiError::BadRequest(
                    "Runners log unplanned workouts only".to_string(),
                ));
            }
            (auth.id(), WorkoutSource::Manual, WorkoutStatus::Completed)
        }
    };

    let now = Utc::now();
    let workout = Workout {
        id: Uuid::new_v4(),
        training_plan_id: req.training_plan_id,
        runner_id,
        date: req.date,
        category: req.category,
        planned_distance: req.planned_distance,
        planned_duration: req.planned_duration,
        intensity: req.intensity,
        terrain: req.terrain,
        elevation_gain: req.elevation_gain,
        status,
        actual_type: non_empty(req.actual_type),
        actual_distance: req.actual_distance,
        actual_duration: req.actual_duration,
        workout_notes: non_empty(req.workout_notes),
        injury_notes: None,
        external_id: None,
        source,
        created_at: now,
        updated_at: now,
    };
    db::workouts::insert_workout(&state.db, &workout).await?;
    info!(workout_id = %workout.id, runner_id = %runner_id, source = %source, "✓ Workout created");

    Ok((StatusCode::CREATED, Json(workout)))
}

/// PUT /api/workouts/:id
pub async fn update_workout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateWorkoutRequest>,
) -> ApiResult<Json<Workout>> {
    let (mut workout, _) = writable_workout(&state, &auth, id).await?;
    validate_metrics(
        req.intensity,
        &[req.planned_distance, req.actual_distance, req.elevation_gain],
        &[req.planned_duration, req.actual_duration],
    )?;

    // A runner may reshape their own unplanned workouts entirely
    let runner_owns_plan_fields = workout.training_plan_id.is_none();
    match auth.role() {
        Role::Coach if req.touches_actual() => {
            return Err(ApiError::BadRequest(
                "Coaches edit the planned fields only".to_string(),
            ))
        }
        Role::Runner if req.touches_planned() && !runner_owns_plan_fields => {
            return Err(ApiError::BadRequest(
                "Runners edit the actual fields and notes only".to_string(),
            ))
        }
        _ => {}
    }

    if let Some(date) = req.date {
        workout.date = date;
    }
    if let Some(category) = req.category {
        workout.category = category;
    }
    if req.planned_distance.is_some() {
        workout.planned_distance = req.planned_distance;
    }
    if req.planned_duration.is_some() {
        workout.planned_duration = req.planned_duration;
    }
    if req.intensity.is_some() {
        workout.intensity = req.intensity;
    }
    if req.terrain.is_some() {
        workout.terrain = req.terrain;
    }
    if req.elevation_gain.is_some() {
        workout.elevation_gain = req.elevation_gain;
    }
    if let Some(actual_type) = req.actual_type {
        workout.actual_type = non_empty(Some(actual_type));
    }
    if req.actual_distance.is_some() {
        workout.actual_distance = req.actual_distance;
    }
    if req.actual_duration.is_some() {
        workout.actual_duration = req.actual_duration;
    }
    if let Some(notes) = req.workout_notes {
        workout.workout_notes = non_empty(Some(notes));
    }
    if let Some(notes) = req.injury_notes {
        workout.injury_notes = non_empty(Some(notes));
    }
    workout.updated_at = Utc::now();

    db::workouts::update_workout(&state.db, &workout).await?;
    Ok(Json(workout))
}

/// Store a status change by the runner, tell the coach and push the update
async fn record_outcome(
    state: &AppState,
    auth: &AuthUser,
    mut workout: Workout,
    coach_id: Option<Uuid>,
) -> ApiResult<Workout> {
    workout.updated_at = Utc::now();
    db::workouts::update_workout(&state.db, &workout).await?;
    info!(workout_id = %workout.id, status = %workout.status, "✓ Workout {}", workout.status);

    if let Some(coach_id) = coach_id {
        let verb = match workout.status {
            WorkoutStatus::Completed => "completed",
            _ => "skipped",
        };
        state
            .notifier()
            .notify_logged(
                coach_id,
                NotificationType::Workout,
                format!("Workout {}", verb),
                format!(
                    "{} {} the {} workout on {}",
                    auth.user.name, verb, workout.category, workout.date
                ),
                Some(json!({ "workout_id": workout.id, "status": workout.status })),
            )
            .await;
    }
    state.event_bus.emit_lossy(UcEvent::WorkoutUpdated {
        workout_id: workout.id,
        runner_id: workout.runner_id,
        coach_id,
        status: workout.status,
        timestamp: workout.updated_at,
    });

    Ok(workout)
}

/// POST /api/workouts/:id/complete
pub async fn complete_workout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteWorkoutRequest>,
) -> ApiResult<Json<Workout>> {
    auth.require_role(Role::Runner)?;
    let (mut workout, coach_id) = writable_workout(&state, &auth, id).await?;
    validate_metrics(None, &[req.actual_distance], &[req.actual_duration])?;

    workout.status = WorkoutStatus::Completed;
    if req.actual_distance.is_some() {
        workout.actual_distance = req.actual_distance;
    }
    if req.actual_duration.is_some() {
        workout.actual_duration = req.actual_duration;
    }
    if let Some(actual_type) = non_empty(req.actual_type) {
        workout.actual_type = Some(actual_type);
    }
    if let Some(notes) = non_empty(req.workout_notes) {
        workout.workout_notes = Some(notes);
    }
    if let Some(notes) = non_empty(req.injury_notes) {
        workout.injury_notes = Some(notes);
    }

    Ok(Json(record_outcome(&state, &auth, workout, coach_id).await?))
}

/// POST /api/workouts/:id/skip
pub async fn skip_workout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<SkipWorkoutRequest>,
) -> ApiResult<Json<Workout>> {
    auth.require_role(Role::Runner)?;
    let (mut workout, coach_id) = writable_workout(&state, &auth, id).await?;

    workout.status = WorkoutStatus::Skipped;
    if let Some(reason) = non_empty(req.reason) {
        workout.workout_notes = Some(reason);
    }

    Ok(Json(record_outcome(&state, &auth, workout, coach_id).await?))
}

/// DELETE /api/workouts/:id
pub async fn delete_workout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let (workout, _) = writable_workout(&state, &auth, id).await?;
    if auth.role() == Role::Runner && workout.training_plan_id.is_some() {
        return Err(ApiError::Forbidden(
            "Not allowed to delete this workout".to_string(),
        ));
    }

    db::workouts::delete_workout(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/workouts/import
pub async fn import_activities(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<ImportActivitiesRequest>,
) -> ApiResult<Json<ImportActivitiesResponse>> {
    auth.require_role(Role::Runner)?;
    for activity in &req.activities {
        validate_metrics(
            None,
            &[activity.distance_miles, activity.elevation_gain_feet],
            &[activity.duration_minutes],
        )?;
    }

    let outcome = training::import_activities(&state.db, auth.id(), &req.activities).await?;
    for workout in &outcome.completed_workouts {
        let coach_id = plan_coach(&state, workout).await?;
        state.event_bus.emit_lossy(UcEvent::WorkoutUpdated {
            workout_id: workout.id,
            runner_id: workout.runner_id,
            coach_id,
            status: workout.status,
            timestamp: workout.updated_at,
        });
    }

    Ok(Json(ImportActivitiesResponse {
        matched: outcome.matched,
        created: outcome.created,
        skipped: outcome.skipped,
        decisions: outcome.decisions,
    }))
}

/// GET /api/workouts/weekly-summary
pub async fn weekly_summary(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<WeeklySummaryQuery>,
) -> ApiResult<Json<Vec<WeekSummary>>> {
    let runner_id = match (auth.role(), query.runner_id) {
        (Role::Coach, None) => {
            return Err(ApiError::BadRequest(
                "runner_id is required for coaches".to_string(),
            ))
        }
        (_, runner_id) => runner_id,
    };
    let runner_ids = readable_runners(&state, &auth, runner_id).await?;
    let workouts = db::workouts::list_workouts(
        &state.db,
        &WorkoutFilter {
            runner_ids,
            ..Default::default()
        },
    )
    .await?;

    let weeks = query.weeks.unwrap_or(DEFAULT_SUMMARY_WEEKS);
    Ok(Json(training::weekly_summary(&workouts, weeks, today())))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/workouts", get(list_workouts).post(create_workout))
        .route("/api/workouts/import", post(import_activities))
        .route("/api/workouts/weekly-summary", get(weekly_summary))
        .route(
            "/api/workouts/:id",
            put(update_workout).get(get_workout).delete(delete_workout),
        )
        .route("/api/workouts/:id/complete", post(complete_workout))
        .route("/api/workouts/:id/skip", post(skip_workout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_ranges() {
        assert!(validate_metrics(Some(1), &[Some(0.0)], &[Some(0)]).is_ok());
        assert!(validate_metrics(Some(10), &[None], &[None]).is_ok());
        assert!(validate_metrics(Some(0), &[], &[]).is_err());
        assert!(validate_metrics(Some(11), &[], &[]).is_err());
        assert!(validate_metrics(None, &[Some(-0.5)], &[]).is_err());
        assert!(validate_metrics(None, &[Some(f64::NAN)], &[]).is_err());
        assert!(validate_metrics(None, &[], &[Some(-1)]).is_err());
    }

    #[test]
    fn test_field_ownership() {
        let coach_edit = UpdateWorkoutRequest {
            planned_distance: Some(8.0),
            ..Default::default()
        };
        assert!(coach_edit.touches_planned());
        assert!(!coach_edit.touches_actual());

        let runner_edit = UpdateWorkoutRequest {
            injury_notes: Some("left knee".to_string()),
            ..Default::default()
        };
        assert!(runner_edit.touches_actual());
        assert!(!runner_edit.touches_planned());
    }
}
