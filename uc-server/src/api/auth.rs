//! Sign-up, sign-in and the session middleware
//!
//! A session token travels as `Authorization: Bearer <token>` or in the
//! `uc_session` cookie. Only its SHA-256 digest is stored.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uc_common::auth::hash_token;
use uc_common::db::models::{Role, User};
use uuid::Uuid;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::accounts;
use crate::AppState;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "uc_session";

/// The signed-in caller, attached to every protected request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    /// Fail with 403 unless the caller has `role`
    pub fn require_role(&self, role: Role) -> ApiResult<()> {
        if self.user.role == role {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("Only a {} can do this", role)))
        }
    }
}

// ========================================
// Middleware
// ========================================

/// Pull the session token from the Authorization header or the cookie
fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Session middleware
///
/// Rejects missing, unknown and expired tokens with 401 (expired sessions
/// are deleted). A session with less than half its lifetime left is
/// extended to a full lifetime.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("Missing session token".to_string()))?;

    let session = db::sessions::find_by_token_hash(&state.db, &hash_token(&token))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid session".to_string()))?;

    let now = Utc::now();
    if session.expires_at <= now {
        db::sessions::delete_session(&state.db, session.id).await?;
        debug!(session_id = %session.id, "Rejected expired session");
        return Err(ApiError::Unauthorized("Session expired".to_string()));
    }

    let ttl = Duration::hours(state.config.auth.session_ttl_hours);
    let mut expires_at = session.expires_at;
    if session.expires_at - now < ttl / 2 {
        expires_at = now + ttl;
        db::sessions::extend_session(&state.db, session.id, expires_at).await?;
        debug!(session_id = %session.id, "Extended session");
    }

    let user = db::users::get_user(&state.db, session.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid session".to_string()))?;

    request.extensions_mut().insert(AuthUser {
        user,
        session_id: session.id,
        expires_at,
    });

    Ok(next.run(request).await)
}

// ========================================
// Handlers
// ========================================

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

fn session_cookie(token: &str, max_age_seconds: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_seconds
    )
}

async fn start_session(state: &AppState, user: User, status: StatusCode) -> ApiResult<Response> {
    let ttl_hours = state.config.auth.session_ttl_hours;
    let issued = accounts::issue_session(&state.db, user.id, ttl_hours).await?;
    let cookie = session_cookie(&issued.token, ttl_hours * 3600);

    Ok((
        status,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            user,
            token: issued.token,
            expires_at: issued.expires_at,
        }),
    )
        .into_response())
}

/// POST /api/auth/sign-up
pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> ApiResult<Response> {
    let user = accounts::register(
        &state.db,
        &req.email,
        &req.password,
        &req.name,
        req.role,
        state.config.auth.min_password_length,
    )
    .await?;

    start_session(&state, user, StatusCode::CREATED).await
}

/// POST /api/auth/sign-in
pub async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> ApiResult<Response> {
    let user = accounts::authenticate(&state.db, &req.email, &req.password).await?;
    info!(user_id = %user.id, "✓ Signed in");
    start_session(&state, user, StatusCode::OK).await
}

/// POST /api/auth/sign-out
pub async fn sign_out(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Response> {
    db::sessions::delete_session(&state.db, auth.session_id).await?;
    info!(user_id = %auth.id(), "Signed out");

    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, session_cookie("", 0))],
    )
        .into_response())
}

/// GET /api/auth/session
pub async fn current_session(Extension(auth): Extension<AuthUser>) -> Json<SessionResponse> {
    Json(SessionResponse {
        user: auth.user,
        expires_at: auth.expires_at,
    })
}

/// Sign-up and sign-in (no session required)
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/sign-up", post(sign_up))
        .route("/api/auth/sign-in", post(sign_in))
}

/// Routes that operate on the caller's own session
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/sign-out", post(sign_out))
        .route("/api/auth/session", get(current_session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        headers.insert(header::COOKIE, HeaderValue::from_static("uc_session=cookie"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_cookie_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; uc_session=tok; other=1"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("tok"));
    }

    #[test]
    fn test_no_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(extract_token(&headers), None);
    }
}
