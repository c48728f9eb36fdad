//! Database schema migrations
//!
//! Versioned migrations let older databases upgrade in place without data loss.
//! The applied version is tracked in the `schema_version` table and every
//! migration is idempotent (safe to run multiple times).
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases in the field depend on them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Use ALTER TABLE** - prefer it over DROP/CREATE to preserve data
//!
//! `CREATE TABLE IF NOT EXISTS` in `init.rs` always builds the newest schema,
//! so on a fresh database the column checks below find nothing to do.

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

/// Migration v1: baseline schema, created by `init.rs`
async fn migrate_v1(_pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: baseline schema");
    Ok(())
}

/// Migration v2: race import provenance and workout import keys
///
/// Databases created before race import and activity sync lack
/// `races.import_source` and `workouts.external_id`.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: import_source and external_id columns");

    add_column_if_missing(
        pool,
        "races",
        "import_source",
        "ALTER TABLE races ADD COLUMN import_source TEXT NOT NULL DEFAULT 'manual'",
    )
    .await?;

    let added = add_column_if_missing(
        pool,
        "workouts",
        "external_id",
        "ALTER TABLE workouts ADD COLUMN external_id TEXT",
    )
    .await?;

    if added || table_exists(pool, "workouts").await? {
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_workouts_runner_external
            ON workouts(runner_id, external_id)
            WHERE external_id IS NOT NULL
            "#,
        )
        .execute(pool)
        .await?;
        info!("  ✓ Ensured unique (runner_id, external_id) index on workouts");
    }

    Ok(())
}

async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Add a column unless the table is missing or already has it
///
/// Returns `true` when the column was added by this call.
async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    ddl: &str,
) -> Result<bool> {
    if !table_exists(pool, table).await? {
        info!("  {} table doesn't exist yet - skipping", table);
        return Ok(false);
    }

    let has_column: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM pragma_table_info('{}') WHERE name = ?",
        table
    ))
    .bind(column)
    .fetch_one(pool)
    .await?;

    if has_column > 0 {
        info!("  {}.{} already exists - skipping", table, column);
        return Ok(false);
    }

    // Concurrent initialization may have added the column between the check and the ALTER
    match sqlx::query(ddl).execute(pool).await {
        Ok(_) => {
            info!("  ✓ Added {} column to {} table", column, table);
            Ok(true)
        }
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            info!("  {}.{} added by concurrent initialization - skipping", table, column);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn create_version_table(pool: &SqlitePool) {
        sqlx::query(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
        )
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_get_schema_version_no_table() {
        let pool = setup_test_db().await;
        assert_eq!(get_schema_version(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_and_get_schema_version() {
        let pool = setup_test_db().await;
        create_version_table(&pool).await;

        set_schema_version(&pool, 1).await.unwrap();
        assert_eq!(get_schema_version(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_migrate_v2_without_tables() {
        let pool = setup_test_db().await;
        migrate_v2(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_migrate_v2_upgrades_legacy_tables() {
        let pool = setup_test_db().await;

        sqlx::query(
            "CREATE TABLE races (id TEXT PRIMARY KEY, name TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TABLE workouts (id TEXT PRIMARY KEY, runner_id TEXT NOT NULL, date TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO races (id, name) VALUES ('r1', 'Old Race')")
            .execute(&pool)
            .await
            .unwrap();

        migrate_v2(&pool).await.unwrap();
        // Second run must be a no-op
        migrate_v2(&pool).await.unwrap();

        let source: String = sqlx::query_scalar("SELECT import_source FROM races WHERE id = 'r1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(source, "manual");

        sqlx::query("INSERT INTO workouts (id, runner_id, date, external_id) VALUES ('w1', 'u', '2025-01-01', 'strava-1')")
            .execute(&pool)
            .await
            .unwrap();
        let duplicate = sqlx::query(
            "INSERT INTO workouts (id, runner_id, date, external_id) VALUES ('w2', 'u', '2025-01-01', 'strava-1')",
        )
        .execute(&pool)
        .await;
        assert!(duplicate.is_err(), "external_id must be unique per runner");
    }

    #[tokio::test]
    async fn test_run_migrations_records_current_version() {
        let pool = setup_test_db().await;
        create_version_table(&pool).await;

        run_migrations(&pool).await.unwrap();
        assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);

        // Idempotent
        run_migrations(&pool).await.unwrap();
        assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
    }
}
