//! Duplicate detection for races and imported activities

use chrono::NaiveDate;
use std::collections::HashSet;
use uc_common::db::models::{Race, Workout, WorkoutCategory, WorkoutStatus};
use uuid::Uuid;

use crate::types::{Activity, DuplicateMatch, RaceDraft, ReconcileDecision};

// ========================================
// Race duplicates
// ========================================

/// Name similarity below which two races are never duplicates
pub const MIN_NAME_SIMILARITY: f64 = 0.80;
/// Date gap (days) beyond which two races are never duplicates
pub const MAX_DATE_GAP_DAYS: i64 = 7;

const NAME_WEIGHT: f64 = 0.6;
const DATE_WEIGHT: f64 = 0.2;
const DISTANCE_WEIGHT: f64 = 0.1;
const LOCATION_WEIGHT: f64 = 0.1;

/// Score used when a compared value is unknown on either side
const UNKNOWN_SCORE: f64 = 0.5;

/// The race attributes compared during de-duplication
#[derive(Debug, Clone)]
pub struct RaceFingerprint {
    pub id: Option<Uuid>,
    pub name: String,
    pub normalized_name: String,
    pub date: Option<NaiveDate>,
    pub distance_miles: Option<f64>,
    pub location: Option<String>,
}

impl RaceFingerprint {
    fn new(
        id: Option<Uuid>,
        name: &str,
        date: Option<NaiveDate>,
        distance_miles: f64,
        location: &str,
    ) -> Self {
        let location = location.trim().to_lowercase();
        Self {
            id,
            name: name.to_string(),
            normalized_name: normalize_race_name(name),
            date,
            distance_miles: (distance_miles > 0.0).then_some(distance_miles),
            location: (!location.is_empty()).then_some(location),
        }
    }
}

impl From<&Race> for RaceFingerprint {
    fn from(race: &Race) -> Self {
        Self::new(
            Some(race.id),
            &race.name,
            race.date,
            race.distance_miles,
            &race.location,
        )
    }
}

impl From<&RaceDraft> for RaceFingerprint {
    fn from(draft: &RaceDraft) -> Self {
        Self::new(None, &draft.name, draft.date, draft.distance_miles, &draft.location)
    }
}

/// Lowercase alphanumeric words with 4-digit years removed
///
/// "The 2025 Western States 100!" → "the western states 100"
pub fn normalize_race_name(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !is_year(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_year(word: &str) -> bool {
    word.len() == 4
        && word.chars().all(|c| c.is_ascii_digit())
        && (word.starts_with("19") || word.starts_with("20"))
}

/// Per-attribute breakdown of a race comparison
#[derive(Debug, Clone, PartialEq)]
pub struct RaceSimilarity {
    pub score: f64,
    pub reasons: Vec<String>,
}

fn distance_score(a: Option<f64>, b: Option<f64>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => {
            let relative = (a - b).abs() / a.max(b);
            if relative <= 0.05 {
                1.0
            } else if relative >= 0.20 {
                0.0
            } else {
                1.0 - (relative - 0.05) / 0.15
            }
        }
        _ => UNKNOWN_SCORE,
    }
}

/// Compare two races; `None` when they cannot be the same event
pub fn compare_races(a: &RaceFingerprint, b: &RaceFingerprint) -> Option<RaceSimilarity> {
    if a.normalized_name.is_empty() || b.normalized_name.is_empty() {
        return None;
    }
    let name = strsim::jaro_winkler(&a.normalized_name, &b.normalized_name);
    if name < MIN_NAME_SIMILARITY {
        return None;
    }

    let mut reasons = vec![format!("name similarity {:.2}", name)];

    let date = match (a.date, b.date) {
        (Some(da), Some(db)) => {
            let gap = (da - db).num_days().abs();
            if gap > MAX_DATE_GAP_DAYS {
                return None;
            }
            reasons.push(if gap == 0 {
                "same date".to_string()
            } else {
                format!("dates {} days apart", gap)
            });
            1.0 - gap as f64 / MAX_DATE_GAP_DAYS as f64
        }
        _ => UNKNOWN_SCORE,
    };

    let distance = distance_score(a.distance_miles, b.distance_miles);
    if distance >= 1.0 {
        reasons.push("distance within 5%".to_string());
    }

    let location = match (&a.location, &b.location) {
        (Some(la), Some(lb)) => {
            let s = strsim::jaro_winkler(la, lb);
            if s >= 0.9 {
                reasons.push("same location".to_string());
            }
            s
        }
        _ => UNKNOWN_SCORE,
    };

    let score = NAME_WEIGHT * name
        + DATE_WEIGHT * date
        + DISTANCE_WEIGHT * distance
        + LOCATION_WEIGHT * location;

    Some(RaceSimilarity { score, reasons })
}

/// Find drafts that duplicate stored races or earlier drafts of the batch
///
/// At most one match (the best scoring) is reported per draft.
pub fn find_race_duplicates(
    drafts: &[RaceDraft],
    existing: &[Race],
    threshold: f64,
) -> Vec<DuplicateMatch> {
    let stored: Vec<RaceFingerprint> = existing.iter().map(RaceFingerprint::from).collect();
    let batch: Vec<RaceFingerprint> = drafts.iter().map(RaceFingerprint::from).collect();

    let mut matches = Vec::new();
    for (index, candidate) in batch.iter().enumerate() {
        let mut best: Option<DuplicateMatch> = None;

        let against_stored = stored.iter().map(|s| (s, None));
        let against_batch = batch[..index].iter().enumerate().map(|(i, b)| (b, Some(i)));

        for (other, batch_index) in against_stored.chain(against_batch) {
            let Some(similarity) = compare_races(candidate, other) else {
                continue;
            };
            if similarity.score < threshold {
                continue;
            }
            if best.as_ref().map_or(true, |b| similarity.score > b.score) {
                best = Some(DuplicateMatch {
                    draft_index: index,
                    line: None,
                    draft_name: candidate.name.clone(),
                    existing_race_id: other.id,
                    batch_index,
                    matched_line: None,
                    matched_name: other.name.clone(),
                    score: (similarity.score * 1000.0).round() / 1000.0,
                    reasons: similarity.reasons,
                });
            }
        }

        if let Some(found) = best {
            tracing::debug!(
                "Duplicate race '{}' ~ '{}' ({:.2})",
                found.draft_name,
                found.matched_name,
                found.score
            );
            matches.push(found);
        }
    }

    matches
}

// ========================================
// Activity reconciliation
// ========================================

/// Minimum score for an activity to complete a planned workout
pub const PLANNED_MATCH_THRESHOLD: f64 = 0.6;
/// Bonus when the activity sport suits the planned category
pub const CATEGORY_BONUS: f64 = 0.2;
/// Relative distance tolerance for a completed-workout duplicate
pub const COMPLETED_DISTANCE_TOLERANCE: f64 = 0.10;

/// Map a free-form sport name to the closest workout category family
fn activity_is_running(activity_type: &str) -> bool {
    let lower = activity_type.to_lowercase();
    lower.contains("run") || lower.contains("jog") || lower.contains("hike")
}

fn category_compatible(activity_type: &str, category: WorkoutCategory) -> bool {
    if activity_is_running(activity_type) {
        return category.is_running();
    }
    let lower = activity_type.to_lowercase();
    match category {
        WorkoutCategory::Strength => ["strength", "weight", "gym", "workout"]
            .iter()
            .any(|k| lower.contains(k)),
        WorkoutCategory::CrossTraining => ["ride", "bike", "cycl", "swim", "row", "elliptical", "ski"]
            .iter()
            .any(|k| lower.contains(k)),
        _ => false,
    }
}

fn distance_closeness(activity: Option<f64>, planned: Option<f64>) -> f64 {
    match (activity, planned) {
        (Some(a), Some(p)) if p > 0.0 => (1.0 - (a - p).abs() / p).max(0.0),
        _ => UNKNOWN_SCORE,
    }
}

fn within_tolerance(a: Option<f64>, b: Option<f64>, tolerance: f64) -> bool {
    match (a, b) {
        (Some(a), Some(b)) if a > 0.0 && b > 0.0 => (a - b).abs() / a.max(b) <= tolerance,
        _ => false,
    }
}

/// Decide, for each activity, how it relates to the runner's stored workouts
///
/// Decisions are returned in activity order. A planned workout is matched by
/// at most one activity.
pub fn reconcile_activities(activities: &[Activity], workouts: &[Workout]) -> Vec<ReconcileDecision> {
    let mut claimed: HashSet<Uuid> = HashSet::new();
    let mut seen_external: HashSet<&str> = HashSet::new();

    activities
        .iter()
        .map(|activity| {
            if let Some(existing) = workouts
                .iter()
                .find(|w| w.external_id.as_deref() == Some(activity.external_id.as_str()))
            {
                return ReconcileDecision::AlreadyImported {
                    workout_id: Some(existing.id),
                };
            }
            if !seen_external.insert(activity.external_id.as_str()) {
                return ReconcileDecision::AlreadyImported { workout_id: None };
            }

            let best_planned = workouts
                .iter()
                .filter(|w| {
                    w.status == WorkoutStatus::Planned
                        && w.date == activity.date
                        && !claimed.contains(&w.id)
                })
                .map(|w| {
                    let mut score = distance_closeness(activity.distance_miles, w.planned_distance);
                    if category_compatible(&activity.activity_type, w.category) {
                        score += CATEGORY_BONUS;
                    }
                    (w.id, score)
                })
                .max_by(|a, b| a.1.total_cmp(&b.1));

            if let Some((workout_id, score)) = best_planned {
                if score >= PLANNED_MATCH_THRESHOLD {
                    claimed.insert(workout_id);
                    return ReconcileDecision::MatchPlanned {
                        workout_id,
                        score: (score * 1000.0).round() / 1000.0,
                    };
                }
            }

            let duplicate = workouts.iter().find(|w| {
                w.status == WorkoutStatus::Completed
                    && w.date == activity.date
                    && w.external_id.is_none()
                    && within_tolerance(
                        activity.distance_miles,
                        w.actual_distance,
                        COMPLETED_DISTANCE_TOLERANCE,
                    )
            });
            if let Some(w) = duplicate {
                return ReconcileDecision::DuplicateOfCompleted { workout_id: w.id };
            }

            ReconcileDecision::CreateNew
        })
        .collect()
}
