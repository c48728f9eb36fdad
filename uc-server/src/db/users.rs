//! User persistence

use chrono::Utc;
use sqlx::{FromRow, Row, SqlitePool};
use uc_common::auth::PasswordHash;
use uc_common::db::models::{Role, User};
use uc_common::{Error, Result};
use uuid::Uuid;

use super::unique_violation;

const USER_COLUMNS: &str = "id, email, name, role, created_at, updated_at";

/// A user together with the stored credential
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    pub user: User,
    pub password_hash: String,
    pub password_salt: String,
}

/// Insert a user; a taken e-mail is a `Conflict`
pub async fn insert_user(pool: &SqlitePool, user: &User, password: &PasswordHash) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, name, role, password_hash, password_salt, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id.to_string())
    .bind(&user.email)
    .bind(&user.name)
    .bind(user.role.as_str())
    .bind(&password.hash)
    .bind(&password.salt)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .map_err(|e| unique_violation(e, format!("Email already registered: {}", user.email)))?;

    Ok(())
}

pub async fn get_user(pool: &SqlitePool, id: Uuid) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| User::from_row(&r)).transpose()?)
}

/// Load a user or fail with `NotFound`
pub async fn require_user(pool: &SqlitePool, id: Uuid) -> Result<User> {
    get_user(pool, id)
        .await?
        .ok_or_else(|| Error::not_found("User", id))
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| User::from_row(&r)).transpose()?)
}

/// Load the credential row for sign-in
pub async fn find_credentials(pool: &SqlitePool, email: &str) -> Result<Option<StoredCredentials>> {
    let row = sqlx::query(&format!(
        "SELECT {}, password_hash, password_salt FROM users WHERE email = ?",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(StoredCredentials {
            user: User::from_row(&row)?,
            password_hash: row.try_get("password_hash")?,
            password_salt: row.try_get("password_salt")?,
        })),
        None => Ok(None),
    }
}

pub async fn update_name(pool: &SqlitePool, id: Uuid, name: &str) -> Result<User> {
    let result = sqlx::query("UPDATE users SET name = ?, updated_at = ? WHERE id = ?")
        .bind(name)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found("User", id));
    }
    require_user(pool, id).await
}

pub async fn list_by_role(pool: &SqlitePool, role: Role) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM users WHERE role = ? ORDER BY name",
        USER_COLUMNS
    ))
    .bind(role.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| User::from_row(r).map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uc_common::auth::hash_password;
    use uc_common::db::init_memory_database;

    fn user(email: &str, role: Role) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: "Test".to_string(),
            role,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let pool = init_memory_database().await.unwrap();
        let password = hash_password("long enough");

        insert_user(&pool, &user("a@example.com", Role::Coach), &password)
            .await
            .unwrap();
        let err = insert_user(&pool, &user("a@example.com", Role::Runner), &password)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_credentials_round_trip() {
        let pool = init_memory_database().await.unwrap();
        let password = hash_password("long enough");
        let stored = user("b@example.com", Role::Runner);
        insert_user(&pool, &stored, &password).await.unwrap();

        let creds = find_credentials(&pool, "b@example.com").await.unwrap().unwrap();
        assert_eq!(creds.user.id, stored.id);
        assert_eq!(creds.user.role, Role::Runner);
        assert_eq!(creds.password_salt, password.salt);

        let renamed = update_name(&pool, stored.id, "Renamed").await.unwrap();
        assert_eq!(renamed.name, "Renamed");
    }
}
