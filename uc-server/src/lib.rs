//! uc-server library - UltraCoach HTTP service
//!
//! JSON API for coaches and runners: relationships, training plans, workouts,
//! messaging, race import and notifications. Exposed as a library so the
//! integration tests can drive the router directly.

pub mod api;
pub mod db;
pub mod error;
pub mod pagination;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use sqlx::SqlitePool;
use std::num::NonZeroU32;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uc_common::config::ServerConfig;
use uc_common::events::EventBus;
use uuid::Uuid;

use crate::services::notifier::Notifier;

/// Request body headroom on top of the import size limit (JSON escaping, other fields)
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// Per-user limiter guarding the race import endpoints
pub type ImportRateLimiter = DefaultKeyedRateLimiter<Uuid>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Resolved configuration
    pub config: Arc<ServerConfig>,
    /// Race import rate limiter, keyed by user id
    pub import_limiter: Arc<ImportRateLimiter>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: ServerConfig) -> Self {
        let event_bus = EventBus::new(config.events.channel_capacity);
        let per_minute =
            NonZeroU32::new(config.import.imports_per_minute).unwrap_or(NonZeroU32::MIN);
        let import_limiter = RateLimiter::keyed(Quota::per_minute(per_minute));

        Self {
            db,
            event_bus,
            config: Arc::new(config),
            import_limiter: Arc::new(import_limiter),
            startup_time: Utc::now(),
        }
    }

    /// Notification writer bound to this state's database and event bus
    pub fn notifier(&self) -> Notifier {
        Notifier::new(self.db.clone(), self.event_bus.clone())
    }
}

/// Build application router
///
/// `/health`, sign-up and sign-in are public; every other route runs behind
/// the session middleware.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    let body_limit = state.config.import.max_file_bytes.saturating_mul(2) + BODY_LIMIT_SLACK;

    // Protected routes (require a session)
    let protected = Router::new()
        .merge(api::auth::session_routes())
        .merge(api::users::routes())
        .merge(api::relationships::routes())
        .merge(api::races::routes())
        .merge(api::plans::routes())
        .merge(api::workouts::routes())
        .merge(api::messages::routes())
        .merge(api::notifications::routes())
        .merge(api::events::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .merge(api::auth::public_routes())
        .merge(api::health::routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
