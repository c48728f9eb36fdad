//! Integration tests for database initialization
//!
//! Covers first-run creation, reopening an existing file, default settings
//! and the relational constraints the server relies on.

use tempfile::TempDir;
use uc_common::db::init::{get_setting, get_setting_or, init_database, init_memory_database, set_setting};
use uc_common::db::{get_schema_version, CURRENT_SCHEMA_VERSION};

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("ultracoach.db");

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("ultracoach.db");

    let pool1 = init_database(&db_path).await.unwrap();
    set_setting(&pool1, "conversation_page_size", "25").await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.as_ref().err());

    // Reopening must not reset existing settings
    let value = get_setting(&pool2.unwrap(), "conversation_page_size").await.unwrap();
    assert_eq!(value.as_deref(), Some("25"));
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let pool = init_memory_database().await.unwrap();

    let interval: u64 = get_setting_or(&pool, "session_cleanup_interval_minutes", 0)
        .await
        .unwrap();
    assert_eq!(interval, 60);

    let page_size: i64 = get_setting_or(&pool, "conversation_page_size", 0).await.unwrap();
    assert_eq!(page_size, 50);

    let missing: i64 = get_setting_or(&pool, "no_such_setting", 7).await.unwrap();
    assert_eq!(missing, 7);
}

#[tokio::test]
async fn test_schema_version_recorded() {
    let pool = init_memory_database().await.unwrap();
    assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
}

async fn insert_user(pool: &sqlx::SqlitePool, id: &str, email: &str, role: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, name, role, password_hash, password_salt, created_at, updated_at)
        VALUES (?, ?, 'Test', ?, 'h', 's', '2025-01-01T00:00:00+00:00', '2025-01-01T00:00:00+00:00')
        "#,
    )
    .bind(id)
    .bind(email)
    .bind(role)
    .execute(pool)
    .await
    .map(|_| ())
}

#[tokio::test]
async fn test_users_role_constraint() {
    let pool = init_memory_database().await.unwrap();

    assert!(insert_user(&pool, "u1", "coach@example.com", "coach").await.is_ok());
    assert!(insert_user(&pool, "u2", "admin@example.com", "admin").await.is_err());
    // Email is unique
    assert!(insert_user(&pool, "u3", "coach@example.com", "runner").await.is_err());
}

#[tokio::test]
async fn test_only_one_open_relationship_per_pair() {
    let pool = init_memory_database().await.unwrap();
    insert_user(&pool, "c", "c@example.com", "coach").await.unwrap();
    insert_user(&pool, "r", "r@example.com", "runner").await.unwrap();

    let insert = |id: &'static str, status: &'static str| {
        let pool = pool.clone();
        async move {
            sqlx::query(
                r#"
                INSERT INTO coach_runners (id, coach_id, runner_id, status, invited_by, created_at, updated_at)
                VALUES (?, 'c', 'r', ?, 'coach', '2025-01-01T00:00:00+00:00', '2025-01-01T00:00:00+00:00')
                "#,
            )
            .bind(id)
            .bind(status)
            .execute(&pool)
            .await
        }
    };

    insert("rel1", "inactive").await.unwrap();
    insert("rel2", "pending").await.unwrap();
    assert!(insert("rel3", "active").await.is_err(), "second open pair must be rejected");
    insert("rel4", "inactive").await.unwrap();
}

#[tokio::test]
async fn test_foreign_keys_enforced() {
    let pool = init_memory_database().await.unwrap();

    let result = sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at)
        VALUES ('s1', 'missing-user', 'abc', '2025-01-01T00:00:00+00:00', '2025-01-01T00:00:00+00:00')
        "#,
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "session for unknown user must be rejected");
}
