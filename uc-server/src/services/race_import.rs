//! Race import pipeline
//!
//! Shared by `POST /api/races/import`, `POST /api/races/bulk` and the
//! `import-races` CLI command:
//!
//! size check → format detection → GPX/CSV parsing → duplicate detection
//! against stored races and within the batch → one-transaction insert.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::info;
use uc_common::config::ImportConfig;
use uc_common::db::models::{ImportSource, NotificationType, Race, Role, User};
use uc_common::events::{EventBus, UcEvent};
use uc_import::dedup::find_race_duplicates;
use uc_import::detect::{check_size, detect_format};
use uc_import::gpx::parse_gpx;
use uc_import::{
    csv::parse_race_csv, DuplicateMatch, ImportError, ImportFormat, ImportLimits, RaceDraft,
    RowError,
};
use uuid::Uuid;

use crate::db;
use crate::error::ApiError;
use crate::services::notifier::Notifier;

/// Errors that abort an import before anything is stored
#[derive(Debug, Error)]
pub enum RaceImportError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Common(#[from] uc_common::Error),
}

impl From<sqlx::Error> for RaceImportError {
    fn from(err: sqlx::Error) -> Self {
        RaceImportError::Common(uc_common::Error::Database(err))
    }
}

impl From<RaceImportError> for ApiError {
    fn from(err: RaceImportError) -> Self {
        match err {
            RaceImportError::Import(e) => ApiError::from(e),
            RaceImportError::Common(e) => ApiError::from(e),
        }
    }
}

pub type ImportResult<T> = Result<T, RaceImportError>;

/// Caller choices for one import
#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Leave out drafts flagged as duplicates (otherwise they are stored too)
    pub skip_duplicates: bool,
    /// Parse and check only; nothing is written
    pub dry_run: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            skip_duplicates: true,
            dry_run: false,
        }
    }
}

/// Outcome of an import
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    /// Detected file format; `None` for bulk submissions
    pub format: Option<ImportFormat>,
    pub dry_run: bool,
    /// Races stored (or, for a dry run, the races that would be stored)
    pub imported: Vec<Race>,
    pub duplicates: Vec<DuplicateMatch>,
    pub row_errors: Vec<RowError>,
    pub date_format: Option<String>,
    /// Canonical field → CSV header it was read from
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub column_map: BTreeMap<String, String>,
}

/// Parsed drafts waiting for duplicate detection
struct ParsedBatch {
    format: Option<ImportFormat>,
    drafts: Vec<RaceDraft>,
    /// Source line of each draft; empty for GPX
    lines: Vec<u64>,
    row_errors: Vec<RowError>,
    date_format: Option<String>,
    column_map: BTreeMap<String, String>,
}

pub struct RaceImporter {
    db: SqlitePool,
    event_bus: EventBus,
    limits: ImportLimits,
    duplicate_threshold: f64,
}

impl RaceImporter {
    pub fn new(db: SqlitePool, event_bus: EventBus, config: &ImportConfig) -> Self {
        Self {
            db,
            event_bus,
            limits: ImportLimits::from(config),
            duplicate_threshold: config.duplicate_threshold,
        }
    }

    /// Import an uploaded GPX or CSV file
    pub async fn import_file(
        &self,
        user: &User,
        file_name: &str,
        content: &[u8],
        options: ImportOptions,
    ) -> ImportResult<ImportReport> {
        ensure_coach(user)?;
        check_size(file_name, content, self.limits.max_file_bytes)?;
        let format = detect_format(file_name, content)?;
        info!(user_id = %user.id, file = file_name, format = ?format, "Importing races");

        let batch = match format {
            ImportFormat::Gpx => {
                let draft = parse_gpx(content, file_name)?.into_draft();
                let problems = draft.validate();
                if !problems.is_empty() {
                    let messages: Vec<String> =
                        problems.into_iter().map(|p| p.message).collect();
                    return Err(ImportError::InvalidGpx(messages.join("; ")).into());
                }
                ParsedBatch {
                    format: Some(format),
                    drafts: vec![draft],
                    lines: Vec::new(),
                    row_errors: Vec::new(),
                    date_format: None,
                    column_map: BTreeMap::new(),
                }
            }
            ImportFormat::Csv => {
                let parsed = parse_race_csv(content, &self.limits)?;
                ParsedBatch {
                    format: Some(format),
                    drafts: parsed.drafts,
                    lines: parsed.lines,
                    row_errors: parsed.row_errors,
                    date_format: parsed.date_format,
                    column_map: parsed.column_map,
                }
            }
        };

        self.store(user, batch, options).await
    }

    /// Import races submitted as JSON
    ///
    /// Each draft is validated like a CSV row; `line` in a row error is the
    /// 1-based position of the draft in the submitted list.
    pub async fn import_drafts(
        &self,
        user: &User,
        drafts: Vec<RaceDraft>,
        options: ImportOptions,
    ) -> ImportResult<ImportReport> {
        ensure_coach(user)?;
        if drafts.len() > self.limits.max_races_per_import {
            return Err(ImportError::TooManyRows {
                rows: drafts.len(),
                limit: self.limits.max_races_per_import,
            }
            .into());
        }

        let mut accepted = Vec::with_capacity(drafts.len());
        let mut lines = Vec::with_capacity(drafts.len());
        let mut row_errors = Vec::new();
        for (index, mut draft) in drafts.into_iter().enumerate() {
            let line = index as u64 + 1;
            let problems = draft.validate();
            if problems.is_empty() {
                draft.import_source = ImportSource::Bulk;
                accepted.push(draft);
                lines.push(line);
            } else {
                row_errors.extend(problems.into_iter().map(|p| RowError {
                    line,
                    field: Some(p.field.to_string()),
                    message: p.message,
                }));
            }
        }

        let batch = ParsedBatch {
            format: None,
            drafts: accepted,
            lines,
            row_errors,
            date_format: None,
            column_map: BTreeMap::new(),
        };
        self.store(user, batch, options).await
    }

    async fn store(
        &self,
        user: &User,
        batch: ParsedBatch,
        options: ImportOptions,
    ) -> ImportResult<ImportReport> {
        let existing = db::races::all_races(&self.db).await?;
        let mut duplicates =
            find_race_duplicates(&batch.drafts, &existing, self.duplicate_threshold);
        for duplicate in &mut duplicates {
            duplicate.line = batch.lines.get(duplicate.draft_index).copied();
            duplicate.matched_line = duplicate
                .batch_index
                .and_then(|i| batch.lines.get(i).copied());
        }
        let duplicate_indices: HashSet<usize> = duplicates.iter().map(|d| d.draft_index).collect();

        let now = Utc::now();
        let races: Vec<Race> = batch
            .drafts
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !(options.skip_duplicates && duplicate_indices.contains(index)))
            .map(|(_, draft)| race_from_draft(draft, user.id, now))
            .collect();

        if !options.dry_run && !races.is_empty() {
            // All or nothing
            let mut tx = self.db.begin().await?;
            for race in &races {
                db::races::insert_race(&mut *tx, race).await?;
            }
            tx.commit().await?;
        }

        let report = ImportReport {
            format: batch.format,
            dry_run: options.dry_run,
            imported: races,
            duplicates,
            row_errors: batch.row_errors,
            date_format: batch.date_format,
            column_map: batch.column_map,
        };

        info!(
            user_id = %user.id,
            imported = report.imported.len(),
            duplicates = report.duplicates.len(),
            row_errors = report.row_errors.len(),
            dry_run = options.dry_run,
            "✓ Race import finished"
        );

        if !options.dry_run {
            self.announce(user, &report).await;
        }

        Ok(report)
    }

    async fn announce(&self, user: &User, report: &ImportReport) {
        self.event_bus.emit_lossy(UcEvent::RacesImported {
            user_id: user.id,
            imported: report.imported.len(),
            duplicates: report.duplicates.len(),
            timestamp: Utc::now(),
        });

        let notifier = Notifier::new(self.db.clone(), self.event_bus.clone());
        notifier
            .notify_logged(
                user.id,
                NotificationType::RaceImport,
                "Race import complete",
                format!(
                    "Imported {} races ({} duplicates, {} row errors)",
                    report.imported.len(),
                    report.duplicates.len(),
                    report.row_errors.len()
                ),
                Some(json!({
                    "imported": report.imported.len(),
                    "duplicates": report.duplicates.len(),
                    "row_errors": report.row_errors.len(),
                })),
            )
            .await;
    }
}

fn ensure_coach(user: &User) -> ImportResult<()> {
    if user.role != Role::Coach {
        return Err(uc_common::Error::Forbidden("Only coaches can import races".to_string()).into());
    }
    Ok(())
}

/// Turn a validated draft into a race owned by `created_by`
pub fn race_from_draft(draft: RaceDraft, created_by: Uuid, now: chrono::DateTime<Utc>) -> Race {
    Race {
        id: Uuid::new_v4(),
        name: draft.name.trim().to_string(),
        date: draft.date,
        distance_miles: draft.distance_miles,
        distance_type: draft.distance_type,
        location: draft.location,
        elevation_gain_feet: draft.elevation_gain_feet,
        terrain_type: draft.terrain_type,
        website_url: draft.website_url,
        notes: draft.notes,
        import_source: draft.import_source,
        created_by,
        created_at: now,
        updated_at: now,
    }
}
