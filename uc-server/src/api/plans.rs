//! Training plan and phase endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uc_common::db::models::{GoalType, NotificationType, PlanPhase, PlanType, Role, TrainingPlan};
use uuid::Uuid;

use crate::api::AuthUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::phases::generate_phases;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub title: String,
    pub description: Option<String>,
    pub runner_id: Uuid,
    pub target_race_id: Option<Uuid>,
    pub goal_type: Option<GoalType>,
    pub plan_type: Option<PlanType>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

/// Partial plan update; omitted fields keep their value
#[derive(Debug, Deserialize)]
pub struct UpdatePlanRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub target_race_id: Option<Uuid>,
    pub goal_type: Option<GoalType>,
    pub plan_type: Option<PlanType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ListPlansQuery {
    pub archived: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    pub archived: bool,
}

fn validate_title(title: &str) -> ApiResult<String> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > 200 {
        return Err(ApiError::BadRequest(
            "Title must be between 1 and 200 characters".to_string(),
        ));
    }
    Ok(title.to_string())
}

fn validate_dates(start: NaiveDate, end: Option<NaiveDate>) -> ApiResult<()> {
    match end {
        Some(end) if end < start => Err(ApiError::BadRequest(
            "start_date must not be after end_date".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Date of the target race, checking that the race exists
async fn target_race_date(state: &AppState, race_id: Option<Uuid>) -> ApiResult<Option<NaiveDate>> {
    let Some(race_id) = race_id else {
        return Ok(None);
    };
    let race = db::races::get_race(&state.db, race_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest(format!("Race {} does not exist", race_id)))?;
    Ok(race.date)
}

/// Plan the caller takes part in
async fn visible_plan(state: &AppState, auth: &AuthUser, id: Uuid) -> ApiResult<TrainingPlan> {
    let plan = db::plans::require_plan(&state.db, id).await?;
    if !plan.involves(auth.id()) {
        return Err(ApiError::Forbidden(
            "Not a participant of this training plan".to_string(),
        ));
    }
    Ok(plan)
}

/// Plan the caller coaches
async fn owned_plan(state: &AppState, auth: &AuthUser, id: Uuid) -> ApiResult<TrainingPlan> {
    let plan = db::plans::require_plan(&state.db, id).await?;
    if plan.coach_id != auth.id() {
        return Err(ApiError::Forbidden(
            "Only the plan's coach can modify it".to_string(),
        ));
    }
    Ok(plan)
}

/// POST /api/training-plans
pub async fn create_plan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreatePlanRequest>,
) -> ApiResult<(StatusCode, Json<TrainingPlan>)> {
    auth.require_role(Role::Coach)?;
    db::relationships::require_active_relationship(&state.db, auth.id(), req.runner_id).await?;

    let title = validate_title(&req.title)?;
    let race_date = target_race_date(&state, req.target_race_id).await?;
    let end_date = req.end_date.or(race_date);
    validate_dates(req.start_date, end_date)?;

    let now = Utc::now();
    let plan = TrainingPlan {
        id: Uuid::new_v4(),
        title,
        description: req.description.filter(|d| !d.trim().is_empty()),
        coach_id: auth.id(),
        runner_id: req.runner_id,
        target_race_id: req.target_race_id,
        goal_type: req.goal_type.unwrap_or(GoalType::Completion),
        plan_type: req.plan_type.unwrap_or(if req.target_race_id.is_some() {
            PlanType::RaceSpecific
        } else {
            PlanType::BaseBuilding
        }),
        start_date: req.start_date,
        end_date,
        archived: false,
        created_at: now,
        updated_at: now,
    };
    db::plans::insert_plan(&state.db, &plan).await?;
    info!(plan_id = %plan.id, coach_id = %plan.coach_id, runner_id = %plan.runner_id, "✓ Training plan created");

    state
        .notifier()
        .notify_logged(
            plan.runner_id,
            NotificationType::TrainingPlan,
            "New training plan",
            format!("{} created the plan \"{}\" for you", auth.user.name, plan.title),
            Some(json!({ "training_plan_id": plan.id })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(plan)))
}

/// GET /api/training-plans
pub async fn list_plans(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListPlansQuery>,
) -> ApiResult<Json<Vec<TrainingPlan>>> {
    let plans = db::plans::list_plans(&state.db, auth.id(), auth.role(), query.archived).await?;
    Ok(Json(plans))
}

/// GET /api/training-plans/:id
pub async fn get_plan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TrainingPlan>> {
    Ok(Json(visible_plan(&state, &auth, id).await?))
}

/// PUT /api/training-plans/:id
pub async fn update_plan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePlanRequest>,
) -> ApiResult<Json<TrainingPlan>> {
    let mut plan = owned_plan(&state, &auth, id).await?;
    db::relationships::require_active_relationship(&state.db, plan.coach_id, plan.runner_id)
        .await?;

    if let Some(title) = req.title {
        plan.title = validate_title(&title)?;
    }
    if let Some(description) = req.description {
        plan.description = Some(description).filter(|d| !d.trim().is_empty());
    }
    if let Some(race_id) = req.target_race_id {
        target_race_date(&state, Some(race_id)).await?;
        plan.target_race_id = Some(race_id);
    }
    if let Some(goal_type) = req.goal_type {
        plan.goal_type = goal_type;
    }
    if let Some(plan_type) = req.plan_type {
        plan.plan_type = plan_type;
    }
    if let Some(start) = req.start_date {
        plan.start_date = start;
    }
    if let Some(end) = req.end_date {
        plan.end_date = Some(end);
    }
    validate_dates(plan.start_date, plan.end_date)?;
    plan.updated_at = Utc::now();

    Ok(Json(db::plans::update_plan(&state.db, &plan).await?))
}

/// DELETE /api/training-plans/:id
pub async fn delete_plan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    owned_plan(&state, &auth, id).await?;
    db::plans::delete_plan(&state.db, id).await?;
    info!(plan_id = %id, "Training plan deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/training-plans/:id/archive
pub async fn archive_plan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<ArchiveRequest>,
) -> ApiResult<Json<TrainingPlan>> {
    let mut plan = owned_plan(&state, &auth, id).await?;
    plan.archived = req.archived;
    plan.updated_at = Utc::now();
    Ok(Json(db::plans::update_plan(&state.db, &plan).await?))
}

/// GET /api/training-plans/:id/phases
pub async fn list_phases(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<PlanPhase>>> {
    visible_plan(&state, &auth, id).await?;
    Ok(Json(db::plans::list_phases(&state.db, id).await?))
}

/// POST /api/training-plans/:id/phases/generate
///
/// Replaces the plan's phases with a fresh periodisation ending on race day
/// (or the plan's end date when it has no dated race).
pub async fn regenerate_phases(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<PlanPhase>>> {
    let plan = owned_plan(&state, &auth, id).await?;
    db::relationships::require_active_relationship(&state.db, plan.coach_id, plan.runner_id)
        .await?;

    let race_date = match plan.target_race_id {
        Some(race_id) => db::races::get_race(&state.db, race_id)
            .await?
            .and_then(|race| race.date),
        None => None,
    };
    let end = race_date.or(plan.end_date).ok_or_else(|| {
        ApiError::BadRequest("Plan needs a dated target race or an end date".to_string())
    })?;
    if end < plan.start_date {
        return Err(ApiError::BadRequest(
            "Plan ends before it starts".to_string(),
        ));
    }

    let phases = generate_phases(plan.id, plan.start_date, end);
    db::plans::replace_phases(&state.db, plan.id, &phases).await?;
    info!(plan_id = %plan.id, phases = phases.len(), "✓ Phases generated");

    Ok(Json(phases))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/training-plans", get(list_plans).post(create_plan))
        .route(
            "/api/training-plans/:id",
            get(get_plan).put(update_plan).delete(delete_plan),
        )
        .route("/api/training-plans/:id/archive", post(archive_plan))
        .route("/api/training-plans/:id/phases", get(list_phases))
        .route(
            "/api/training-plans/:id/phases/generate",
            post(regenerate_phases),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_trimmed_and_bounded() {
        assert_eq!(validate_title("  Road to Western ").unwrap(), "Road to Western");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(201)).is_err());
    }

    #[test]
    fn test_dates_ordered() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let before = NaiveDate::from_ymd_opt(2025, 2, 28).unwrap();
        assert!(validate_dates(start, None).is_ok());
        assert!(validate_dates(start, Some(start)).is_ok());
        assert!(matches!(
            validate_dates(start, Some(before)),
            Err(ApiError::BadRequest(_))
        ));
    }
}
