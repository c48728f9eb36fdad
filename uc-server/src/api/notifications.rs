//! Notification inbox endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uc_common::db::models::Notification;
use uuid::Uuid;

use crate::api::AuthUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MarkAllResponse {
    pub updated: u64,
}

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListNotificationsQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let notifications =
        db::notifications::list_notifications(&state.db, auth.id(), query.unread_only, limit)
            .await?;
    Ok(Json(notifications))
}

/// PATCH /api/notifications/:id/read
///
/// Other users' notifications answer 404, same as missing ones.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !db::notifications::mark_read(&state.db, id, auth.id()).await? {
        return Err(ApiError::NotFound(format!("Notification {}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/notifications/mark-all-read
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<MarkAllResponse>> {
    let updated = db::notifications::mark_all_read(&state.db, auth.id()).await?;
    Ok(Json(MarkAllResponse { updated }))
}

/// DELETE /api/notifications/:id
pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !db::notifications::delete_notification(&state.db, id, auth.id()).await? {
        return Err(ApiError::NotFound(format!("Notification {}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/mark-all-read", post(mark_all_read))
        .route("/api/notifications/:id/read", patch(mark_read))
        .route("/api/notifications/:id", delete(delete_notification))
}
