//! Account creation and session issuing
//!
//! Used by the auth handlers and by the seed command.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::info;
use uc_common::auth::{
    generate_session_token, hash_password, hash_token, normalize_email, validate_password_policy,
    verify_password,
};
use uc_common::db::models::{Role, User};
use uc_common::{Error, Result};
use uuid::Uuid;

use crate::db;

pub const MAX_NAME_LENGTH: usize = 100;

/// A freshly issued bearer token; the plain token is never stored
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Validate and store a new user with default settings
pub async fn register(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    name: &str,
    role: Role,
    min_password_length: usize,
) -> Result<User> {
    let email = normalize_email(email)?;
    validate_password_policy(password, min_password_length)?;
    let name = validate_name(name)?;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        email,
        name,
        role,
        created_at: now,
        updated_at: now,
    };
    db::users::insert_user(pool, &user, &hash_password(password)).await?;
    db::user_settings::create_default(pool, user.id).await?;

    info!(user_id = %user.id, role = %user.role, "✓ Registered user");
    Ok(user)
}

/// Check an e-mail/password pair
///
/// Unknown e-mail and wrong password give the same error.
pub async fn authenticate(pool: &SqlitePool, email: &str, password: &str) -> Result<User> {
    let invalid = || Error::Unauthorized("Invalid email or password".to_string());

    let email = normalize_email(email).map_err(|_| invalid())?;
    let creds = db::users::find_credentials(pool, &email)
        .await?
        .ok_or_else(invalid)?;

    if verify_password(password, &creds.password_hash, &creds.password_salt) {
        Ok(creds.user)
    } else {
        Err(invalid())
    }
}

pub async fn issue_session(pool: &SqlitePool, user_id: Uuid, ttl_hours: i64) -> Result<IssuedSession> {
    let token = generate_session_token();
    let expires_at = Utc::now() + Duration::hours(ttl_hours);
    let session = db::sessions::create_session(pool, user_id, &hash_token(&token), expires_at).await?;

    Ok(IssuedSession {
        session_id: session.id,
        token,
        expires_at,
    })
}

/// Trimmed display name, 1..=100 characters
pub fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    let length = name.chars().count();
    if length == 0 || length > MAX_NAME_LENGTH {
        return Err(Error::InvalidInput(format!(
            "Name must be between 1 and {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uc_common::db::init_memory_database;

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let pool = init_memory_database().await.unwrap();
        let user = register(&pool, " Coach@Example.com ", "password123", "Casey", Role::Coach, 8)
            .await
            .unwrap();
        assert_eq!(user.email, "coach@example.com");

        let signed_in = authenticate(&pool, "COACH@example.com", "password123").await.unwrap();
        assert_eq!(signed_in.id, user.id);

        let wrong = authenticate(&pool, "coach@example.com", "password124").await.unwrap_err();
        let unknown = authenticate(&pool, "nobody@example.com", "password123").await.unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn test_register_rejects_short_password_and_blank_name() {
        let pool = init_memory_database().await.unwrap();
        assert!(matches!(
            register(&pool, "a@example.com", "short", "A", Role::Runner, 8).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            register(&pool, "a@example.com", "password123", "  ", Role::Runner, 8).await,
            Err(Error::InvalidInput(_))
        ));
    }
}
