//! Coach/runner relationship endpoints
//!
//! Status machine: pending → active (invitee only), pending → inactive and
//! active → inactive (either party). Nothing leaves inactive.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uc_common::db::models::{
    CoachRunner, NotificationType, RelationshipStatus, RelationshipType, Role,
};
use uc_common::events::UcEvent;
use uuid::Uuid;

use crate::api::users::PublicProfile;
use crate::api::AuthUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRelationshipRequest {
    pub target_user_id: Uuid,
    pub relationship_type: Option<RelationshipType>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRelationshipRequest {
    pub status: RelationshipStatus,
}

#[derive(Debug, Deserialize)]
pub struct ListRelationshipsQuery {
    pub status: Option<RelationshipStatus>,
}

/// A relationship as seen by one participant
#[derive(Debug, Serialize)]
pub struct RelationshipView {
    #[serde(flatten)]
    pub relationship: CoachRunner,
    pub partner: Option<PublicProfile>,
}

async fn view(state: &AppState, rel: CoachRunner, viewer: Uuid) -> ApiResult<RelationshipView> {
    let partner = db::users::get_user(&state.db, rel.partner_of(viewer))
        .await?
        .map(|u| PublicProfile::from(&u));
    Ok(RelationshipView {
        relationship: rel,
        partner,
    })
}

/// POST /api/coach-runners
pub async fn create_relationship(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateRelationshipRequest>,
) -> ApiResult<(StatusCode, Json<RelationshipView>)> {
    let target = db::users::get_user(&state.db, req.target_user_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Target user does not exist".to_string()))?;
    if target.role != auth.role().counterpart() {
        return Err(ApiError::BadRequest(format!(
            "A {} can only connect with a {}",
            auth.role(),
            auth.role().counterpart()
        )));
    }

    let (coach_id, runner_id) = match auth.role() {
        Role::Coach => (auth.id(), target.id),
        Role::Runner => (target.id, auth.id()),
    };
    if db::relationships::find_open_pair(&state.db, coach_id, runner_id)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(
            "A pending or active relationship already exists".to_string(),
        ));
    }

    let now = Utc::now();
    let rel = CoachRunner {
        id: Uuid::new_v4(),
        coach_id,
        runner_id,
        status: RelationshipStatus::Pending,
        relationship_type: req.relationship_type.unwrap_or(RelationshipType::Standard),
        invited_by: auth.role(),
        notes: req.notes.filter(|n| !n.trim().is_empty()),
        started_at: None,
        ended_at: None,
        created_at: now,
        updated_at: now,
    };
    db::relationships::insert_relationship(&state.db, &rel).await?;
    info!(relationship_id = %rel.id, coach_id = %coach_id, runner_id = %runner_id, "✓ Invitation sent");

    state
        .notifier()
        .notify_logged(
            target.id,
            NotificationType::CoachInvitation,
            "New coaching invitation",
            format!("{} wants to connect with you", auth.user.name),
            Some(json!({ "relationship_id": rel.id })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(view(&state, rel, auth.id()).await?)))
}

/// Check a status change requested by `actor`
pub fn check_transition(
    rel: &CoachRunner,
    actor: Uuid,
    next: RelationshipStatus,
) -> ApiResult<()> {
    use RelationshipStatus::*;

    if !rel.involves(actor) {
        return Err(ApiError::Forbidden(
            "Not a participant of this relationship".to_string(),
        ));
    }
    match (rel.status, next) {
        (Pending, Active) if rel.invitee() == actor => Ok(()),
        (Pending, Active) => Err(ApiError::Forbidden(
            "Only the invited user can accept".to_string(),
        )),
        (Pending, Inactive) | (Active, Inactive) => Ok(()),
        (from, to) => Err(ApiError::BadRequest(format!(
            "Cannot change relationship from {} to {}",
            from, to
        ))),
    }
}

/// PATCH /api/coach-runners/:id
pub async fn update_relationship(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRelationshipRequest>,
) -> ApiResult<Json<RelationshipView>> {
    let rel = db::relationships::get_relationship(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Relationship {}", id)))?;
    check_transition(&rel, auth.id(), req.status)?;

    let now = Utc::now();
    let (started_at, ended_at) = match req.status {
        RelationshipStatus::Active => (Some(now), None),
        RelationshipStatus::Inactive => (rel.started_at, Some(now)),
        RelationshipStatus::Pending => (rel.started_at, rel.ended_at),
    };
    let updated =
        db::relationships::update_status(&state.db, id, req.status, started_at, ended_at).await?;
    info!(relationship_id = %id, status = %updated.status, "✓ Relationship updated");

    let other = updated.partner_of(auth.id());
    let message = match (rel.status, updated.status) {
        (RelationshipStatus::Pending, RelationshipStatus::Active) => {
            format!("{} accepted your invitation", auth.user.name)
        }
        (RelationshipStatus::Pending, RelationshipStatus::Inactive) => {
            format!("{} withdrew or declined the invitation", auth.user.name)
        }
        _ => format!("{} ended the coaching relationship", auth.user.name),
    };
    state
        .notifier()
        .notify_logged(
            other,
            NotificationType::Relationship,
            "Coaching relationship updated",
            message,
            Some(json!({ "relationship_id": id, "status": updated.status })),
        )
        .await;
    state.event_bus.emit_lossy(UcEvent::RelationshipChanged {
        relationship_id: id,
        coach_id: updated.coach_id,
        runner_id: updated.runner_id,
        status: updated.status,
        timestamp: now,
    });

    Ok(Json(view(&state, updated, auth.id()).await?))
}

/// GET /api/coach-runners
pub async fn list_relationships(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListRelationshipsQuery>,
) -> ApiResult<Json<Vec<RelationshipView>>> {
    let rels = db::relationships::list_for_user(&state.db, auth.id(), query.status).await?;
    let mut views = Vec::with_capacity(rels.len());
    for rel in rels {
        views.push(view(&state, rel, auth.id()).await?);
    }
    Ok(Json(views))
}

/// GET /api/coach-runners/available
pub async fn list_available(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<PublicProfile>>> {
    let users = db::relationships::available_partners(&state.db, &auth.user).await?;
    Ok(Json(users.iter().map(PublicProfile::from).collect()))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/coach-runners",
            get(list_relationships).post(create_relationship),
        )
        .route("/api/coach-runners/available", get(list_available))
        .route("/api/coach-runners/:id", patch(update_relationship))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(status: RelationshipStatus, invited_by: Role) -> CoachRunner {
        let now = Utc::now();
        CoachRunner {
            id: Uuid::new_v4(),
            coach_id: Uuid::new_v4(),
            runner_id: Uuid::new_v4(),
            status,
            relationship_type: RelationshipType::Standard,
            invited_by,
            notes: None,
            started_at: None,
            ended_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_only_invitee_accepts() {
        let pending = rel(RelationshipStatus::Pending, Role::Coach);
        assert!(check_transition(&pending, pending.runner_id, RelationshipStatus::Active).is_ok());
        assert!(matches!(
            check_transition(&pending, pending.coach_id, RelationshipStatus::Active),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn test_either_party_ends() {
        let active = rel(RelationshipStatus::Active, Role::Runner);
        assert!(check_transition(&active, active.coach_id, RelationshipStatus::Inactive).is_ok());
        assert!(check_transition(&active, active.runner_id, RelationshipStatus::Inactive).is_ok());
    }

    #[test]
    fn test_invalid_transitions() {
        let inactive = rel(RelationshipStatus::Inactive, Role::Coach);
        assert!(matches!(
            check_transition(&inactive, inactive.runner_id, RelationshipStatus::Active),
            Err(ApiError::BadRequest(_))
        ));
        let active = rel(RelationshipStatus::Active, Role::Coach);
        assert!(matches!(
            check_transition(&active, active.coach_id, RelationshipStatus::Pending),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            check_transition(&active, Uuid::new_v4(), RelationshipStatus::Inactive),
            Err(ApiError::Forbidden(_))
        ));
    }
}
