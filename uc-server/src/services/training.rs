//! Workout analytics and activity import

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::info;
use uc_common::db::models::{Workout, WorkoutCategory, WorkoutSource, WorkoutStatus};
use uc_common::time::week_start;
use uc_common::Result;
use uc_import::dedup::reconcile_activities;
use uc_import::{Activity, ReconcileDecision};
use uuid::Uuid;

use crate::db;
use crate::db::workouts::WorkoutFilter;

pub const DEFAULT_SUMMARY_WEEKS: i64 = 8;
pub const MAX_SUMMARY_WEEKS: i64 = 52;

// ========================================
// Weekly summary
// ========================================

/// Training volume of one ISO week (Monday start)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekSummary {
    pub week_start: NaiveDate,
    pub planned_miles: f64,
    pub actual_miles: f64,
    /// Workouts scheduled by a plan
    pub planned_count: usize,
    /// Scheduled workouts marked completed
    pub completed_count: usize,
    /// completed_count / planned_count, 0 when nothing was scheduled
    pub completion_rate: f64,
}

/// Summaries for the `weeks` weeks ending with the week containing `today`, oldest first
pub fn weekly_summary(workouts: &[Workout], weeks: i64, today: NaiveDate) -> Vec<WeekSummary> {
    let weeks = weeks.clamp(1, MAX_SUMMARY_WEEKS);
    let current = week_start(today);
    let first = current - Duration::weeks(weeks - 1);

    (0..weeks)
        .map(|i| {
            let start = first + Duration::weeks(i);
            let end = start + Duration::days(6);
            let in_week: Vec<&Workout> = workouts
                .iter()
                .filter(|w| w.date >= start && w.date <= end)
                .collect();

            let planned_miles: f64 = in_week.iter().filter_map(|w| w.planned_distance).sum();
            let actual_miles: f64 = in_week
                .iter()
                .filter(|w| w.status == WorkoutStatus::Completed)
                .filter_map(|w| w.actual_distance)
                .sum();
            let scheduled: Vec<&&Workout> = in_week
                .iter()
                .filter(|w| w.source == WorkoutSource::Planned)
                .collect();
            let planned_count = scheduled.len();
            let completed_count = scheduled
                .iter()
                .filter(|w| w.status == WorkoutStatus::Completed)
                .count();
            let completion_rate = if planned_count == 0 {
                0.0
            } else {
                round2(completed_count as f64 / planned_count as f64)
            };

            WeekSummary {
                week_start: start,
                planned_miles: round2(planned_miles),
                actual_miles: round2(actual_miles),
                planned_count,
                completed_count,
                completion_rate,
            }
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ========================================
// Activity import
// ========================================

/// Result of applying imported activities
#[derive(Debug, Clone, Serialize)]
pub struct ActivityImportOutcome {
    pub matched: usize,
    pub created: usize,
    pub skipped: usize,
    /// One decision per submitted activity, in order
    pub decisions: Vec<ReconcileDecision>,
    /// Planned workouts completed by the import
    #[serde(skip)]
    pub completed_workouts: Vec<Workout>,
}

/// Workout category for a free-form activity sport
pub fn category_for_activity(activity_type: &str) -> WorkoutCategory {
    let lower = activity_type.to_lowercase();
    if lower.contains("run") || lower.contains("jog") || lower.contains("hike") {
        WorkoutCategory::Easy
    } else if ["strength", "weight", "gym"].iter().any(|k| lower.contains(k)) {
        WorkoutCategory::Strength
    } else {
        WorkoutCategory::CrossTraining
    }
}

/// Reconcile activities with the runner's workouts and apply the decisions in one transaction
pub async fn import_activities(
    pool: &SqlitePool,
    runner_id: Uuid,
    activities: &[Activity],
) -> Result<ActivityImportOutcome> {
    let existing = db::workouts::list_workouts(
        pool,
        &WorkoutFilter {
            runner_ids: vec![runner_id],
            ..Default::default()
        },
    )
    .await?;
    // Planned workouts of plans whose relationship ended cannot be completed by an import
    let active_plans: HashSet<Uuid> = db::plans::active_plan_ids(pool, runner_id)
        .await?
        .into_iter()
        .collect();
    let existing: Vec<Workout> = existing
        .into_iter()
        .filter(|w| match w.training_plan_id {
            Some(plan_id) if w.status == WorkoutStatus::Planned => active_plans.contains(&plan_id),
            _ => true,
        })
        .collect();
    let decisions = reconcile_activities(activities, &existing);

    let mut outcome = ActivityImportOutcome {
        matched: 0,
        created: 0,
        skipped: 0,
        decisions: decisions.clone(),
        completed_workouts: Vec::new(),
    };

    let now = Utc::now();
    let mut tx = pool.begin().await?;
    for (activity, decision) in activities.iter().zip(&decisions) {
        match decision {
            ReconcileDecision::MatchPlanned { workout_id, .. } => {
                let Some(planned) = existing.iter().find(|w| w.id == *workout_id) else {
                    continue;
                };
                let mut workout = planned.clone();
                workout.status = WorkoutStatus::Completed;
                workout.actual_type = Some(activity.activity_type.clone());
                workout.actual_distance = activity.distance_miles;
                workout.actual_duration = activity.duration_minutes;
                workout.external_id = Some(activity.external_id.clone());
                if workout.elevation_gain.is_none() {
                    workout.elevation_gain = activity.elevation_gain_feet;
                }
                workout.updated_at = now;
                db::workouts::update_workout(&mut *tx, &workout).await?;
                outcome.matched += 1;
                outcome.completed_workouts.push(workout);
            }
            ReconcileDecision::CreateNew => {
                let workout = Workout {
                    id: Uuid::new_v4(),
                    training_plan_id: None,
                    runner_id,
                    date: activity.date,
                    category: category_for_activity(&activity.activity_type),
                    planned_distance: None,
                    planned_duration: None,
                    intensity: None,
                    terrain: None,
                    elevation_gain: activity.elevation_gain_feet,
                    status: WorkoutStatus::Completed,
                    actual_type: Some(activity.activity_type.clone()),
                    actual_distance: activity.distance_miles,
                    actual_duration: activity.duration_minutes,
                    workout_notes: activity.name.clone(),
                    injury_notes: None,
                    external_id: Some(activity.external_id.clone()),
                    source: WorkoutSource::Import,
                    created_at: now,
                    updated_at: now,
                };
                db::workouts::insert_workout(&mut *tx, &workout).await?;
                outcome.created += 1;
            }
            ReconcileDecision::AlreadyImported { .. }
            | ReconcileDecision::DuplicateOfCompleted { .. } => outcome.skipped += 1,
        }
    }
    tx.commit().await?;

    info!(
        runner_id = %runner_id,
        matched = outcome.matched,
        created = outcome.created,
        skipped = outcome.skipped,
        "✓ Activity import applied"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn workout(date: NaiveDate, source: WorkoutSource, status: WorkoutStatus) -> Workout {
        let now = Utc::now();
        Workout {
            id: Uuid::new_v4(),
            training_plan_id: None,
            runner_id: Uuid::nil(),
            date,
            category: WorkoutCategory::Easy,
            planned_distance: Some(5.0),
            planned_duration: None,
            intensity: None,
            terrain: None,
            elevation_gain: None,
            status,
            actual_type: None,
            actual_distance: Some(6.0),
            actual_duration: None,
            workout_notes: None,
            injury_notes: None,
            external_id: None,
            source,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_weekly_summary_buckets_by_monday() {
        // 2025-06-18 is a Wednesday; its week starts 2025-06-16
        let today = date(2025, 6, 18);
        let workouts = vec![
            workout(date(2025, 6, 16), WorkoutSource::Planned, WorkoutStatus::Completed),
            workout(date(2025, 6, 17), WorkoutSource::Planned, WorkoutStatus::Planned),
            workout(date(2025, 6, 15), WorkoutSource::Planned, WorkoutStatus::Skipped),
            workout(date(2025, 6, 14), WorkoutSource::Manual, WorkoutStatus::Completed),
        ];

        let summary = weekly_summary(&workouts, 2, today);
        assert_eq!(summary.len(), 2);

        let previous = &summary[0];
        assert_eq!(previous.week_start, date(2025, 6, 9));
        assert_eq!(previous.planned_count, 1);
        assert_eq!(previous.completed_count, 0);
        assert_eq!(previous.actual_miles, 6.0);

        let current = &summary[1];
        assert_eq!(current.week_start, date(2025, 6, 16));
        assert_eq!(current.planned_miles, 10.0);
        assert_eq!(current.actual_miles, 6.0);
        assert_eq!(current.planned_count, 2);
        assert_eq!(current.completed_count, 1);
        assert_eq!(current.completion_rate, 0.5);
    }

    #[test]
    fn test_weekly_summary_clamps_weeks() {
        let today = date(2025, 6, 18);
        assert_eq!(weekly_summary(&[], 0, today).len(), 1);
        assert_eq!(weekly_summary(&[], 500, today).len(), MAX_SUMMARY_WEEKS as usize);
    }

    #[test]
    fn test_activity_categories() {
        assert_eq!(category_for_activity("Trail Run"), WorkoutCategory::Easy);
        assert_eq!(category_for_activity("WeightTraining"), WorkoutCategory::Strength);
        assert_eq!(category_for_activity("Ride"), WorkoutCategory::CrossTraining);
    }
}
