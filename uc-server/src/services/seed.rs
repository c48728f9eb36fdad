//! Demo data for local development
//!
//! Seeding is keyed on the demo e-mail addresses and race names, so running
//! it twice leaves the database unchanged.

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;
use uc_common::db::models::{
    CoachRunner, DistanceType, GoalType, ImportSource, PhaseKind, PlanType, Race,
    RelationshipStatus, RelationshipType, Role, TerrainType, TrainingPlan, User, Workout,
    WorkoutCategory, WorkoutSource, WorkoutStatus,
};
use uc_common::time::{today, week_start};
use uc_common::Result;
use uuid::Uuid;

use crate::db;
use crate::services::{accounts, phases};

/// Password of every demo account
pub const DEMO_PASSWORD: &str = "ultracoach-demo";

const DEMO_COACH: (&str, &str) = ("coach@ultracoach.dev", "Casey Ridge");
const DEMO_RUNNERS: [(&str, &str); 2] = [
    ("runner@ultracoach.dev", "Riley Summit"),
    ("sam@ultracoach.dev", "Sam Switchback"),
];
const DEMO_PLAN_TITLE: &str = "Road to the Hundred";

/// Tables emptied by `seed --reset`, children first
const DOMAIN_TABLES: &[&str] = &[
    "notifications",
    "messages",
    "workouts",
    "plan_phases",
    "training_plans",
    "races",
    "coach_runners",
    "sessions",
    "user_settings",
    "users",
];

/// What a seed run created
#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedReport {
    pub users: usize,
    pub relationships: usize,
    pub races: usize,
    pub plans: usize,
    pub phases: usize,
    pub workouts: usize,
}

struct DemoRace {
    name: &'static str,
    days_out: i64,
    miles: f64,
    location: &'static str,
    gain: f64,
    terrain: TerrainType,
    website: &'static str,
}

const DEMO_RACES: [DemoRace; 4] = [
    DemoRace {
        name: "Cascade Crest 100",
        days_out: 126,
        miles: 100.0,
        location: "Easton, WA",
        gain: 21_000.0,
        terrain: TerrainType::Mountain,
        website: "https://www.cascadecrest100.com",
    },
    DemoRace {
        name: "Chuckanut 50K",
        days_out: 45,
        miles: 31.1,
        location: "Bellingham, WA",
        gain: 5_200.0,
        terrain: TerrainType::Trail,
        website: "https://www.chuckanut50krace.com",
    },
    DemoRace {
        name: "Gorge Waterfalls 100K",
        days_out: 80,
        miles: 62.1,
        location: "Cascade Locks, OR",
        gain: 11_800.0,
        terrain: TerrainType::Trail,
        website: "https://rainshadowrunning.com",
    },
    DemoRace {
        name: "Seattle Marathon",
        days_out: 200,
        miles: 26.2,
        location: "Seattle, WA",
        gain: 1_100.0,
        terrain: TerrainType::Road,
        website: "https://seattlemarathon.org",
    },
];

/// Delete every row of the domain tables
pub async fn reset(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    for table in DOMAIN_TABLES {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    info!("✓ Cleared domain tables");
    Ok(())
}

/// Create whatever part of the demo data set is missing
pub async fn seed(pool: &SqlitePool, min_password_length: usize) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    let coach = ensure_user(pool, DEMO_COACH, Role::Coach, min_password_length, &mut report).await?;
    let mut runners = Vec::with_capacity(DEMO_RUNNERS.len());
    for demo in DEMO_RUNNERS {
        runners.push(ensure_user(pool, demo, Role::Runner, min_password_length, &mut report).await?);
    }

    // Only the first runner is coached; the second shows up as available
    let runner = &runners[0];
    if db::relationships::find_open_pair(pool, coach.id, runner.id)
        .await?
        .is_none()
    {
        let now = Utc::now();
        db::relationships::insert_relationship(
            pool,
            &CoachRunner {
                id: Uuid::new_v4(),
                coach_id: coach.id,
                runner_id: runner.id,
                status: RelationshipStatus::Active,
                relationship_type: RelationshipType::Standard,
                invited_by: Role::Coach,
                notes: Some("Demo relationship".to_string()),
                started_at: Some(now),
                ended_at: None,
                created_at: now,
                updated_at: now,
            },
        )
        .await?;
        report.relationships += 1;
    }

    let mut target = None;
    for demo in &DEMO_RACES {
        let race = ensure_race(pool, demo, coach.id, &mut report).await?;
        if target.is_none() {
            target = Some(race);
        }
    }

    if let Some(race) = target {
        ensure_plan(pool, &coach, runner, &race, &mut report).await?;
    }

    info!(
        users = report.users,
        races = report.races,
        workouts = report.workouts,
        "✓ Seed complete"
    );
    Ok(report)
}

async fn ensure_user(
    pool: &SqlitePool,
    (email, name): (&str, &str),
    role: Role,
    min_password_length: usize,
    report: &mut SeedReport,
) -> Result<User> {
    if let Some(user) = db::users::find_by_email(pool, email).await? {
        return Ok(user);
    }
    let user = accounts::register(pool, email, DEMO_PASSWORD, name, role, min_password_length).await?;
    report.users += 1;
    Ok(user)
}

async fn ensure_race(
    pool: &SqlitePool,
    demo: &DemoRace,
    created_by: Uuid,
    report: &mut SeedReport,
) -> Result<Race> {
    let existing_id: Option<String> = sqlx::query_scalar("SELECT id FROM races WHERE name = ?")
        .bind(demo.name)
        .fetch_optional(pool)
        .await?;
    if let Some(id) = existing_id {
        return db::races::require_race(pool, uc_common::uuid_utils::parse(&id)?).await;
    }

    let now = Utc::now();
    let race = Race {
        id: Uuid::new_v4(),
        name: demo.name.to_string(),
        date: Some(today() + Duration::days(demo.days_out)),
        distance_miles: demo.miles,
        distance_type: DistanceType::classify(demo.miles),
        location: demo.location.to_string(),
        elevation_gain_feet: demo.gain,
        terrain_type: demo.terrain,
        website_url: Some(demo.website.to_string()),
        notes: None,
        import_source: ImportSource::Manual,
        created_by,
        created_at: now,
        updated_at: now,
    };
    db::races::insert_race(pool, &race).await?;
    report.races += 1;
    Ok(race)
}

async fn ensure_plan(
    pool: &SqlitePool,
    coach: &User,
    runner: &User,
    race: &Race,
    report: &mut SeedReport,
) -> Result<()> {
    let existing = db::plans::list_plans(pool, coach.id, Role::Coach, None).await?;
    if existing
        .iter()
        .any(|p| p.runner_id == runner.id && p.title == DEMO_PLAN_TITLE)
    {
        return Ok(());
    }

    let start = week_start(today());
    let race_date = race.date.unwrap_or(start + Duration::weeks(16));
    let now = Utc::now();
    let plan = TrainingPlan {
        id: Uuid::new_v4(),
        title: DEMO_PLAN_TITLE.to_string(),
        description: Some(format!("Build-up for {}", race.name)),
        coach_id: coach.id,
        runner_id: runner.id,
        target_race_id: Some(race.id),
        goal_type: GoalType::Completion,
        plan_type: PlanType::RaceSpecific,
        start_date: start,
        end_date: Some(race_date),
        archived: false,
        created_at: now,
        updated_at: now,
    };
    db::plans::insert_plan(pool, &plan).await?;
    report.plans += 1;

    let plan_phases = phases::generate_phases(plan.id, start, race_date);
    db::plans::replace_phases(pool, plan.id, &plan_phases).await?;
    report.phases += plan_phases.len();

    let mut tx = pool.begin().await?;
    for phase in &plan_phases {
        let mut week = phase.start_date;
        while week <= phase.end_date {
            for (offset, category, miles) in weekly_template(phase.phase) {
                let date = week + Duration::days(offset);
                if date > phase.end_date || date >= race_date {
                    continue;
                }
                let workout = planned_workout(&plan, date, category, miles);
                db::workouts::insert_workout(&mut *tx, &workout).await?;
                report.workouts += 1;
            }
            week += Duration::weeks(1);
        }
    }
    tx.commit().await?;

    Ok(())
}

/// (day offset from the week start, category, planned miles) per phase
fn weekly_template(phase: PhaseKind) -> [(i64, WorkoutCategory, f64); 4] {
    let (volume, quality) = match phase {
        PhaseKind::Base => (1.0, WorkoutCategory::Easy),
        PhaseKind::Build => (1.3, WorkoutCategory::Tempo),
        PhaseKind::Peak => (1.5, WorkoutCategory::Interval),
        PhaseKind::Taper | PhaseKind::Recovery => (0.7, WorkoutCategory::Easy),
    };
    [
        (1, WorkoutCategory::Easy, 5.0 * volume),
        (3, quality, 6.0 * volume),
        (5, WorkoutCategory::LongRun, 12.0 * volume),
        (6, WorkoutCategory::Recovery, 4.0 * volume),
    ]
}

fn planned_workout(
    plan: &TrainingPlan,
    date: NaiveDate,
    category: WorkoutCategory,
    miles: f64,
) -> Workout {
    let now = Utc::now();
    let intensity = match category {
        WorkoutCategory::Interval => 8,
        WorkoutCategory::Tempo => 7,
        WorkoutCategory::LongRun => 6,
        WorkoutCategory::Recovery => 2,
        _ => 4,
    };
    Workout {
        id: Uuid::new_v4(),
        training_plan_id: Some(plan.id),
        runner_id: plan.runner_id,
        date,
        category,
        planned_distance: Some((miles * 10.0).round() / 10.0),
        planned_duration: Some((miles * 11.0).round() as i64),
        intensity: Some(intensity),
        terrain: Some(TerrainType::Trail),
        elevation_gain: None,
        status: WorkoutStatus::Planned,
        actual_type: None,
        actual_distance: None,
        actual_duration: None,
        workout_notes: None,
        injury_notes: None,
        external_id: None,
        source: WorkoutSource::Planned,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uc_common::db::init_memory_database;

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let pool = init_memory_database().await.unwrap();

        let first = seed(&pool, 8).await.unwrap();
        assert_eq!(first.users, 3);
        assert_eq!(first.relationships, 1);
        assert_eq!(first.races, DEMO_RACES.len());
        assert_eq!(first.plans, 1);
        assert!(first.phases >= 4);
        assert!(first.workouts > 0);

        let second = seed(&pool, 8).await.unwrap();
        assert_eq!(second.users, 0);
        assert_eq!(second.races, 0);
        assert_eq!(second.workouts, 0);
        assert_eq!(count(&pool, "users").await, 3);
        assert_eq!(count(&pool, "training_plans").await, 1);
    }

    #[tokio::test]
    async fn test_reset_empties_domain_tables() {
        let pool = init_memory_database().await.unwrap();
        seed(&pool, 8).await.unwrap();

        reset(&pool).await.unwrap();
        for table in DOMAIN_TABLES {
            assert_eq!(count(&pool, table).await, 0, "{} not empty", table);
        }
        // Settings are runtime state, not domain data
        assert!(count(&pool, "settings").await > 0);
    }
}
