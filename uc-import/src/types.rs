//! Import data types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uc_common::config::ImportConfig;
use uc_common::db::models::{DistanceType, ImportSource, TerrainType};
use uuid::Uuid;

/// Longest accepted race name
pub const MAX_NAME_LENGTH: usize = 200;

/// Longest accepted race distance
pub const MAX_DISTANCE_MILES: f64 = 1000.0;

/// Detected file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Gpx,
    Csv,
}

impl ImportFormat {
    pub fn source(&self) -> ImportSource {
        match self {
            ImportFormat::Gpx => ImportSource::Gpx,
            ImportFormat::Csv => ImportSource::Csv,
        }
    }
}

/// Size limits applied before and during parsing
#[derive(Debug, Clone, Copy)]
pub struct ImportLimits {
    pub max_file_bytes: usize,
    pub max_races_per_import: usize,
}

impl Default for ImportLimits {
    fn default() -> Self {
        Self::from(&ImportConfig::default())
    }
}

impl From<&ImportConfig> for ImportLimits {
    fn from(config: &ImportConfig) -> Self {
        Self {
            max_file_bytes: config.max_file_bytes,
            max_races_per_import: config.max_races_per_import,
        }
    }
}

// ========================================
// Races
// ========================================

/// A race ready to be stored, produced by a parser or an API request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceDraft {
    pub name: String,
    pub date: Option<NaiveDate>,
    pub distance_miles: f64,
    pub distance_type: DistanceType,
    pub location: String,
    pub elevation_gain_feet: f64,
    pub terrain_type: TerrainType,
    pub website_url: Option<String>,
    pub notes: Option<String>,
    pub import_source: ImportSource,
}

/// One failed validation rule on a draft
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl RaceDraft {
    /// Check the draft against the rules every stored race must satisfy
    ///
    /// Returns every violated rule; an empty vector means the draft is valid.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        let name_length = self.name.trim().chars().count();
        if name_length == 0 {
            errors.push(FieldError {
                field: "name",
                message: "name is required".to_string(),
            });
        } else if name_length > MAX_NAME_LENGTH {
            errors.push(FieldError {
                field: "name",
                message: format!("name exceeds {} characters", MAX_NAME_LENGTH),
            });
        }

        if !self.distance_miles.is_finite() || self.distance_miles <= 0.0 {
            errors.push(FieldError {
                field: "distance",
                message: "distance must be greater than 0".to_string(),
            });
        } else if self.distance_miles > MAX_DISTANCE_MILES {
            errors.push(FieldError {
                field: "distance",
                message: format!("distance exceeds {} miles", MAX_DISTANCE_MILES),
            });
        }

        if !self.elevation_gain_feet.is_finite() || self.elevation_gain_feet < 0.0 {
            errors.push(FieldError {
                field: "elevation_gain",
                message: "elevation gain cannot be negative".to_string(),
            });
        }

        if let Some(url) = &self.website_url {
            let lower = url.to_ascii_lowercase();
            if !(lower.starts_with("http://") || lower.starts_with("https://")) {
                errors.push(FieldError {
                    field: "website_url",
                    message: format!("website URL must start with http:// or https://: {}", url),
                });
            }
        }

        errors
    }
}

/// A CSV row that could not be turned into a draft
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    /// 1-based line number in the file; the header is line 1
    pub line: u64,
    pub field: Option<String>,
    pub message: String,
}

/// A draft that matches a stored race or an earlier draft of the same batch
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateMatch {
    /// Index of the draft among the drafts passed to duplicate detection
    pub draft_index: usize,
    /// Source line of the draft (CSV file line or 1-based bulk position), same numbering as `RowError::line`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    pub draft_name: String,
    /// Stored race matched, if the match is not within the batch
    pub existing_race_id: Option<Uuid>,
    /// Earlier draft matched, if the match is within the batch
    pub batch_index: Option<usize>,
    /// Source line of the earlier draft matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_line: Option<u64>,
    pub matched_name: String,
    pub score: f64,
    pub reasons: Vec<String>,
}

// ========================================
// Activities
// ========================================

/// A completed activity pulled from a device or tracking service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub external_id: String,
    pub date: NaiveDate,
    /// Free-form sport name such as "Run", "Trail Run" or "Ride"
    pub activity_type: String,
    pub distance_miles: Option<f64>,
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub elevation_gain_feet: Option<f64>,
}

/// What to do with one imported activity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReconcileDecision {
    /// The activity id is already stored (or repeats an earlier activity of the batch)
    AlreadyImported { workout_id: Option<Uuid> },
    /// Complete this planned workout with the activity's values
    MatchPlanned { workout_id: Uuid, score: f64 },
    /// A manually completed workout already records this activity
    DuplicateOfCompleted { workout_id: Uuid },
    /// Store the activity as a new workout
    CreateNew,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> RaceDraft {
        RaceDraft {
            name: "Western States".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 28),
            distance_miles: 100.2,
            distance_type: DistanceType::HundredMile,
            location: "Olympic Valley, CA".to_string(),
            elevation_gain_feet: 18_090.0,
            terrain_type: TerrainType::Trail,
            website_url: Some("https://www.wser.org".to_string()),
            notes: None,
            import_source: ImportSource::Manual,
        }
    }

    #[test]
    fn test_valid_draft_has_no_errors() {
        assert!(draft().validate().is_empty());
    }

    #[test]
    fn test_draft_rule_violations() {
        let mut bad = draft();
        bad.name = "   ".to_string();
        bad.distance_miles = 1200.0;
        bad.elevation_gain_feet = -5.0;
        bad.website_url = Some("wser.org".to_string());

        let fields: Vec<&str> = bad.validate().iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["name", "distance", "elevation_gain", "website_url"]);
    }

    #[test]
    fn test_long_name_rejected() {
        let mut bad = draft();
        bad.name = "x".repeat(MAX_NAME_LENGTH + 1);
        assert_eq!(bad.validate().len(), 1);
    }
}
