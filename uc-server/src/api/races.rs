//! Race catalogue and race import endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uc_common::db::models::{DistanceType, ImportSource, Race, Role, TerrainType};
use uc_import::RaceDraft;
use uuid::Uuid;

use crate::api::AuthUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Pagination, RACE_PAGE_SIZE};
use crate::services::race_import::race_from_draft;
use crate::services::{ImportOptions, ImportReport, RaceImporter};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RaceListQuery {
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct RaceListResponse {
    pub races: Vec<Race>,
    pub pagination: Pagination,
}

/// Race fields accepted by create and update
///
/// A missing distance is taken from the distance type; a missing type is
/// classified from the distance.
#[derive(Debug, Deserialize)]
pub struct RaceInput {
    pub name: String,
    pub date: Option<NaiveDate>,
    pub distance_miles: Option<f64>,
    pub distance_type: Option<DistanceType>,
    #[serde(default)]
    pub location: String,
    pub elevation_gain_feet: Option<f64>,
    pub terrain_type: Option<TerrainType>,
    pub website_url: Option<String>,
    pub notes: Option<String>,
}

impl RaceInput {
    /// Build a draft and run the same checks as a CSV row
    pub fn into_draft(self, source: ImportSource) -> ApiResult<RaceDraft> {
        let distance_miles = self
            .distance_miles
            .or_else(|| self.distance_type.and_then(|t| t.standard_miles()))
            .ok_or_else(|| {
                ApiError::BadRequest("distance_miles or a standard distance_type is required".into())
            })?;

        let draft = RaceDraft {
            name: self.name.trim().to_string(),
            date: self.date,
            distance_miles,
            distance_type: self
                .distance_type
                .unwrap_or_else(|| DistanceType::classify(distance_miles)),
            location: self.location.trim().to_string(),
            elevation_gain_feet: self.elevation_gain_feet.unwrap_or(0.0),
            terrain_type: self.terrain_type.unwrap_or(TerrainType::Trail),
            website_url: self.website_url.filter(|u| !u.trim().is_empty()),
            notes: self.notes.filter(|n| !n.trim().is_empty()),
            import_source: source,
        };

        let problems = draft.validate();
        if !problems.is_empty() {
            let messages: Vec<String> = problems.into_iter().map(|p| p.message).collect();
            return Err(ApiError::BadRequest(messages.join("; ")));
        }
        Ok(draft)
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub file_name: String,
    pub content: String,
    #[serde(default = "default_true")]
    pub skip_duplicates: bool,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub struct BulkImportRequest {
    pub races: Vec<RaceDraft>,
    #[serde(default = "default_true")]
    pub skip_duplicates: bool,
    #[serde(default)]
    pub dry_run: bool,
}

/// GET /api/races
pub async fn list_races(
    State(state): State<AppState>,
    Query(query): Query<RaceListQuery>,
) -> ApiResult<Json<RaceListResponse>> {
    let search = query.search.as_deref();
    let total = db::races::count_races(&state.db, search).await?;
    let pagination = calculate_pagination(total, query.page, RACE_PAGE_SIZE);
    let races =
        db::races::list_races(&state.db, search, pagination.page_size, pagination.offset).await?;

    Ok(Json(RaceListResponse { races, pagination }))
}

/// GET /api/races/:id
pub async fn get_race(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Race>> {
    Ok(Json(db::races::require_race(&state.db, id).await?))
}

/// POST /api/races
pub async fn create_race(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<RaceInput>,
) -> ApiResult<(StatusCode, Json<Race>)> {
    auth.require_role(Role::Coach)?;
    let draft = input.into_draft(ImportSource::Manual)?;
    let race = race_from_draft(draft, auth.id(), Utc::now());
    db::races::insert_race(&state.db, &race).await?;

    info!(race_id = %race.id, name = %race.name, "✓ Race created");
    Ok((StatusCode::CREATED, Json(race)))
}

async fn owned_race(state: &AppState, auth: &AuthUser, id: Uuid) -> ApiResult<Race> {
    let race = db::races::require_race(&state.db, id).await?;
    if race.created_by != auth.id() {
        return Err(ApiError::Forbidden(
            "Only the creator can modify this race".to_string(),
        ));
    }
    Ok(race)
}

/// PUT /api/races/:id
pub async fn update_race(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<RaceInput>,
) -> ApiResult<Json<Race>> {
    let existing = owned_race(&state, &auth, id).await?;
    let draft = input.into_draft(existing.import_source)?;

    let race = Race {
        name: draft.name,
        date: draft.date,
        distance_miles: draft.distance_miles,
        distance_type: draft.distance_type,
        location: draft.location,
        elevation_gain_feet: draft.elevation_gain_feet,
        terrain_type: draft.terrain_type,
        website_url: draft.website_url,
        notes: draft.notes,
        ..existing
    };
    Ok(Json(db::races::update_race(&state.db, &race).await?))
}

/// DELETE /api/races/:id
pub async fn delete_race(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    owned_race(&state, &auth, id).await?;
    if db::races::is_targeted(&state.db, id).await? {
        return Err(ApiError::Conflict(
            "Race is the target of a training plan".to_string(),
        ));
    }
    db::races::delete_race(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Coach check followed by the per-user import quota
fn admit_import(state: &AppState, auth: &AuthUser) -> ApiResult<()> {
    auth.require_role(Role::Coach)?;
    if state.import_limiter.check_key(&auth.id()).is_err() {
        warn!(user_id = %auth.id(), "Race import rate limit exceeded");
        return Err(ApiError::TooManyRequests(format!(
            "At most {} imports per minute",
            state.config.import.imports_per_minute
        )));
    }
    Ok(())
}

fn importer(state: &AppState) -> RaceImporter {
    RaceImporter::new(state.db.clone(), state.event_bus.clone(), &state.config.import)
}

/// POST /api/races/import
pub async fn import_races(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<ImportRequest>,
) -> ApiResult<Json<ImportReport>> {
    admit_import(&state, &auth)?;
    let options = ImportOptions {
        skip_duplicates: req.skip_duplicates,
        dry_run: req.dry_run,
    };
    let report = importer(&state)
        .import_file(&auth.user, &req.file_name, req.content.as_bytes(), options)
        .await?;
    Ok(Json(report))
}

/// POST /api/races/bulk
pub async fn bulk_import(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<BulkImportRequest>,
) -> ApiResult<Json<ImportReport>> {
    admit_import(&state, &auth)?;
    let options = ImportOptions {
        skip_duplicates: req.skip_duplicates,
        dry_run: req.dry_run,
    };
    let report = importer(&state)
        .import_drafts(&auth.user, req.races, options)
        .await?;
    Ok(Json(report))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/races", get(list_races).post(create_race))
        .route("/api/races/import", post(import_races))
        .route("/api/races/bulk", post(bulk_import))
        .route(
            "/api/races/:id",
            get(get_race).put(update_race).delete(delete_race),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> RaceInput {
        RaceInput {
            name: "  Hardrock 100 ".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 7, 11),
            distance_miles: None,
            distance_type: Some(DistanceType::HundredMile),
            location: "Silverton, CO".to_string(),
            elevation_gain_feet: Some(33_050.0),
            terrain_type: Some(TerrainType::Mountain),
            website_url: Some("https://hardrock100.com".to_string()),
            notes: Some("  ".to_string()),
        }
    }

    #[test]
    fn test_distance_from_type() {
        let draft = input().into_draft(ImportSource::Manual).unwrap();
        assert_eq!(draft.name, "Hardrock 100");
        assert_eq!(draft.distance_miles, 100.0);
        assert_eq!(draft.notes, None);
    }

    #[test]
    fn test_type_from_distance() {
        let mut race = input();
        race.distance_type = None;
        race.distance_miles = Some(31.0);
        let draft = race.into_draft(ImportSource::Manual).unwrap();
        assert_eq!(draft.distance_type, DistanceType::FiftyK);
    }

    #[test]
    fn test_invalid_draft_rejected() {
        let mut race = input();
        race.website_url = Some("hardrock100.com".to_string());
        assert!(matches!(
            race.into_draft(ImportSource::Manual),
            Err(ApiError::BadRequest(_))
        ));

        let mut race = input();
        race.distance_type = Some(DistanceType::Custom);
        assert!(race.into_draft(ImportSource::Manual).is_err());
    }
}
