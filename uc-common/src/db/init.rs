//! Database initialization
//!
//! Opening a database always runs the same idempotent sequence:
//! 1. `CREATE TABLE IF NOT EXISTS` for every table
//! 2. Versioned migrations (see `migrations.rs`)
//! 3. Default settings (`INSERT OR IGNORE`)

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to every connection
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // WAL allows concurrent readers with one writer
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    prepare(&pool).await?;

    Ok(pool)
}

/// Initialize a private in-memory database (tests, dry runs)
///
/// The pool holds exactly one connection that is never recycled, because an
/// in-memory SQLite database lives only as long as its connection.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    prepare(&pool).await?;

    Ok(pool)
}

async fn prepare(pool: &SqlitePool) -> Result<()> {
    create_schema(pool).await?;
    crate::db::migrations::run_migrations(pool).await?;
    init_default_settings(pool).await?;
    Ok(())
}

/// Create every table (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_users_table(pool).await?;
    create_sessions_table(pool).await?;
    create_user_settings_table(pool).await?;
    create_coach_runners_table(pool).await?;
    create_races_table(pool).await?;
    create_training_plans_table(pool).await?;
    create_plan_phases_table(pool).await?;
    create_workouts_table(pool).await?;
    create_messages_table(pool).await?;
    create_notifications_table(pool).await?;
    Ok(())
}

async fn execute_all(pool: &SqlitePool, statements: &[&str]) -> Result<()> {
    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#],
    )
    .await
}

/// Create the settings table
///
/// Stores runtime key-value state (not user configuration, which lives in TOML).
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#],
    )
    .await
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('coach', 'runner')),
            password_hash TEXT NOT NULL,
            password_salt TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#],
    )
    .await
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                token_hash TEXT NOT NULL UNIQUE,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
        ],
    )
    .await
}

async fn create_user_settings_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
        CREATE TABLE IF NOT EXISTS user_settings (
            user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            units TEXT NOT NULL DEFAULT 'imperial',
            notification_preferences TEXT NOT NULL DEFAULT '{}',
            updated_at TEXT NOT NULL
        )
        "#],
    )
    .await
}

async fn create_coach_runners_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS coach_runners (
                id TEXT PRIMARY KEY,
                coach_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                runner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status TEXT NOT NULL DEFAULT 'pending',
                relationship_type TEXT NOT NULL DEFAULT 'standard',
                invited_by TEXT NOT NULL,
                notes TEXT,
                started_at TEXT,
                ended_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            // At most one open (pending or active) relationship per pair
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_coach_runners_open_pair
            ON coach_runners(coach_id, runner_id)
            WHERE status IN ('pending', 'active')
            "#,
            "CREATE INDEX IF NOT EXISTS idx_coach_runners_runner ON coach_runners(runner_id)",
        ],
    )
    .await
}

async fn create_races_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS races (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                date TEXT,
                distance_miles REAL NOT NULL,
                distance_type TEXT NOT NULL,
                location TEXT NOT NULL,
                elevation_gain_feet REAL NOT NULL DEFAULT 0,
                terrain_type TEXT NOT NULL DEFAULT 'trail',
                website_url TEXT,
                notes TEXT,
                import_source TEXT NOT NULL DEFAULT 'manual',
                created_by TEXT NOT NULL REFERENCES users(id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_races_date ON races(date)",
        ],
    )
    .await
}

async fn create_training_plans_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS training_plans (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                coach_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                runner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                target_race_id TEXT REFERENCES races(id),
                goal_type TEXT NOT NULL DEFAULT 'completion',
                plan_type TEXT NOT NULL DEFAULT 'race_specific',
                start_date TEXT NOT NULL,
                end_date TEXT,
                archived INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_training_plans_coach ON training_plans(coach_id)",
            "CREATE INDEX IF NOT EXISTS idx_training_plans_runner ON training_plans(runner_id)",
        ],
    )
    .await
}

async fn create_plan_phases_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[r#"
        CREATE TABLE IF NOT EXISTS plan_phases (
            id TEXT PRIMARY KEY,
            training_plan_id TEXT NOT NULL REFERENCES training_plans(id) ON DELETE CASCADE,
            phase TEXT NOT NULL,
            phase_order INTEGER NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            UNIQUE (training_plan_id, phase_order)
        )
        "#],
    )
    .await
}

async fn create_workouts_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS workouts (
                id TEXT PRIMARY KEY,
                training_plan_id TEXT REFERENCES training_plans(id) ON DELETE CASCADE,
                runner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                date TEXT NOT NULL,
                category TEXT NOT NULL,
                planned_distance REAL,
                planned_duration INTEGER,
                intensity INTEGER,
                terrain TEXT,
                elevation_gain REAL,
                status TEXT NOT NULL DEFAULT 'planned',
                actual_type TEXT,
                actual_distance REAL,
                actual_duration INTEGER,
                workout_notes TEXT,
                injury_notes TEXT,
                external_id TEXT,
                source TEXT NOT NULL DEFAULT 'planned',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_workouts_runner_date ON workouts(runner_id, date)",
            "CREATE INDEX IF NOT EXISTS idx_workouts_plan ON workouts(training_plan_id)",
        ],
    )
    .await
}

async fn create_messages_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                recipient_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                workout_id TEXT REFERENCES workouts(id) ON DELETE SET NULL,
                context_type TEXT NOT NULL DEFAULT 'general',
                read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_messages_pair ON messages(sender_id, recipient_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_messages_recipient_unread ON messages(recipient_id, read)",
        ],
    )
    .await
}

async fn create_notifications_table(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                type TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                data TEXT,
                read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, read, created_at)",
        ],
    )
    .await
}

/// Initialize default settings
///
/// Existing values are kept; NULL values are reset to the default.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "session_cleanup_interval_minutes", "60").await?;
    ensure_setting(pool, "conversation_page_size", "50").await?;
    Ok(())
}

/// Insert a setting if missing or NULL
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?;

    sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?;

    Ok(())
}

/// Read a setting value
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(value.flatten())
}

/// Read a setting and parse it, falling back to `default` when absent or malformed
pub async fn get_setting_or<T: FromStr>(pool: &SqlitePool, key: &str, default: T) -> Result<T> {
    Ok(get_setting(pool, key)
        .await?
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default))
}

/// Insert or replace a setting value
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}
