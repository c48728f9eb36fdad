//! uc-server - UltraCoach HTTP service and maintenance commands
//!
//! `serve` runs the JSON API; `seed` loads demo data; `import-races` runs a
//! race file through the same pipeline as `POST /api/races/import`.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};
use uc_common::auth::normalize_email;
use uc_common::config::{CliOverrides, ServerConfig};
use uc_common::db::{get_setting_or, init_database};
use uc_server::services::{seed, ImportOptions, RaceImporter};
use uc_server::{build_router, db, AppState};

/// Command-line arguments for uc-server
#[derive(Parser, Debug)]
#[command(name = "uc-server")]
#[command(about = "UltraCoach coaching API")]
#[command(version)]
struct Args {
    /// TOML config file (default: platform config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding ultracoach.db
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:5780
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Log filter, e.g. "info" or "uc_server=debug"
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Create demo users, races, a plan and workouts
    Seed {
        /// Wipe all domain tables first
        #[arg(long)]
        reset: bool,
    },
    /// Import a GPX or CSV race file on behalf of a coach
    ImportRaces {
        #[arg(long)]
        file: PathBuf,
        /// Email of the importing coach
        #[arg(long)]
        user: String,
        /// Report what would be imported without storing anything
        #[arg(long)]
        dry_run: bool,
        /// Store races even when they look like duplicates
        #[arg(long)]
        allow_duplicates: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging starts before config resolution; the filter is narrowed to the
    // configured level afterwards unless RUST_LOG is set.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let filter_from_env = env_filter.is_some();
    let (filter, filter_handle) = reload::Layer::new(
        env_filter.unwrap_or_else(|| EnvFilter::new(args.log_level.as_deref().unwrap_or("info"))),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting UltraCoach (uc-server) v{}",
        env!("CARGO_PKG_VERSION")
    );

    let overrides = CliOverrides {
        config_file: args.config.clone(),
        data_dir: args.data_dir.clone(),
        bind: args.bind.clone(),
        log_level: args.log_level.clone(),
    };
    let config = ServerConfig::resolve(&overrides).context("Failed to resolve configuration")?;
    if !filter_from_env {
        filter_handle
            .reload(EnvFilter::new(&config.log_level))
            .context("Failed to apply log level")?;
    }

    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());
    let pool = match init_database(&db_path).await {
        Ok(pool) => {
            info!("✓ Database ready");
            pool
        }
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, config).await,
        Command::Seed { reset } => {
            if reset {
                seed::reset(&pool).await?;
                info!("Domain tables cleared");
            }
            let report = seed::seed(&pool, config.auth.min_password_length).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::ImportRaces {
            file,
            user,
            dry_run,
            allow_duplicates,
        } => {
            let email = normalize_email(&user)?;
            let importer_user = db::users::find_by_email(&pool, &email)
                .await?
                .ok_or_else(|| anyhow!("No user with email {}", email))?;
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let state = AppState::new(pool, config);
            let importer = RaceImporter::new(
                state.db.clone(),
                state.event_bus.clone(),
                &state.config.import,
            );
            let options = ImportOptions {
                skip_duplicates: !allow_duplicates,
                dry_run,
            };
            let report = importer
                .import_file(&importer_user, &file_name, &bytes, options)
                .await
                .map_err(|e| anyhow!("Import failed: {}", e))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn serve(pool: sqlx::SqlitePool, config: ServerConfig) -> Result<()> {
    let bind = config.bind;
    let cleanup_minutes: u64 =
        get_setting_or(&pool, "session_cleanup_interval_minutes", 60).await?;

    let state = AppState::new(pool, config);
    spawn_session_cleanup(state.db.clone(), cleanup_minutes.max(1));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("uc-server listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically delete expired sessions
fn spawn_session_cleanup(pool: sqlx::SqlitePool, every_minutes: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(every_minutes * 60));
        loop {
            ticker.tick().await;
            match db::sessions::delete_expired(&pool, chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Expired sessions removed"),
                Err(e) => warn!("Session cleanup failed: {}", e),
            }
        }
    });
}
