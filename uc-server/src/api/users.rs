//! Profile and settings endpoints

use axum::{extract::State, routing::get, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uc_common::db::models::{NotificationType, Role, Units, User, UserSettings};
use uuid::Uuid;

use crate::api::AuthUser;
use crate::db;
use crate::error::ApiResult;
use crate::services::accounts::validate_name;
use crate::AppState;

/// What other users may see of a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for PublicProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: String,
}

/// Partial settings update; omitted fields keep their value
#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub units: Option<Units>,
    /// Merged into the stored switches
    pub notification_preferences: Option<BTreeMap<NotificationType, bool>>,
}

/// GET /api/users/me
pub async fn get_me(Extension(auth): Extension<AuthUser>) -> Json<User> {
    Json(auth.user)
}

/// PUT /api/users/me
pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    let name = validate_name(&req.name)?;
    let user = db::users::update_name(&state.db, auth.id(), &name).await?;
    Ok(Json(user))
}

/// GET /api/settings
pub async fn get_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<UserSettings>> {
    let settings = db::user_settings::get_settings(&state.db, auth.id()).await?;
    Ok(Json(settings))
}

/// PUT /api/settings
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<UserSettings>> {
    let mut settings = db::user_settings::get_settings(&state.db, auth.id()).await?;
    if let Some(units) = req.units {
        settings.units = units;
    }
    if let Some(switches) = req.notification_preferences {
        settings.notification_preferences.0.extend(switches);
    }

    let updated = db::user_settings::update_settings(&state.db, &settings).await?;
    Ok(Json(updated))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/users/me", get(get_me).put(update_me))
        .route("/api/settings", get(get_settings).put(update_settings))
}
