//! Database models
//!
//! Identifiers are stored as hyphenated UUID text and enumerations as their
//! text form; the `FromRow` impls below do the conversion.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::columns::{json_column, opt_enum_column, opt_uuid_column, enum_column, uuid_column};

/// Declares a TEXT-backed enumeration with serde names, `as_str` and `FromStr`
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> crate::Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(crate::Error::InvalidInput(format!(
                        "Unknown {} value: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

// ========================================
// Enumerations
// ========================================

text_enum! {
    /// The two user roles connected by a coaching relationship
    pub enum Role {
        Coach => "coach",
        Runner => "runner",
    }
}

impl Role {
    /// The role on the other side of a coaching relationship
    pub fn counterpart(&self) -> Role {
        match self {
            Role::Coach => Role::Runner,
            Role::Runner => Role::Coach,
        }
    }
}

text_enum! {
    pub enum RelationshipStatus {
        Pending => "pending",
        Active => "active",
        Inactive => "inactive",
    }
}

text_enum! {
    pub enum RelationshipType {
        Standard => "standard",
        Premium => "premium",
    }
}

text_enum! {
    /// Race distance category
    pub enum DistanceType {
        FiveK => "5K",
        TenK => "10K",
        HalfMarathon => "Half Marathon",
        Marathon => "Marathon",
        FiftyK => "50K",
        FiftyMile => "50M",
        HundredK => "100K",
        HundredMile => "100M",
        Custom => "Custom",
    }
}

/// Relative tolerance used when classifying a distance into a standard category
const DISTANCE_CLASSIFY_TOLERANCE: f64 = 0.08;

impl DistanceType {
    /// Nominal distance in miles; `None` for `Custom`
    pub fn standard_miles(&self) -> Option<f64> {
        match self {
            DistanceType::FiveK => Some(3.107),
            DistanceType::TenK => Some(6.214),
            DistanceType::HalfMarathon => Some(13.109),
            DistanceType::Marathon => Some(26.219),
            DistanceType::FiftyK => Some(31.069),
            DistanceType::FiftyMile => Some(50.0),
            DistanceType::HundredK => Some(62.137),
            DistanceType::HundredMile => Some(100.0),
            DistanceType::Custom => None,
        }
    }

    /// Closest standard category within ±8 %, otherwise `Custom`
    pub fn classify(miles: f64) -> DistanceType {
        if !miles.is_finite() || miles <= 0.0 {
            return DistanceType::Custom;
        }

        DistanceType::ALL
            .iter()
            .filter_map(|t| t.standard_miles().map(|nominal| (*t, (miles - nominal).abs() / nominal)))
            .filter(|(_, rel)| *rel <= DISTANCE_CLASSIFY_TOLERANCE)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(t, _)| t)
            .unwrap_or(DistanceType::Custom)
    }
}

text_enum! {
    pub enum TerrainType {
        Trail => "trail",
        Mountain => "mountain",
        Road => "road",
        Mixed => "mixed",
    }
}

text_enum! {
    /// How a race record entered the database
    pub enum ImportSource {
        Manual => "manual",
        Gpx => "gpx",
        Csv => "csv",
        Bulk => "bulk",
    }
}

text_enum! {
    pub enum GoalType {
        Completion => "completion",
        Time => "time",
        Placement => "placement",
    }
}

text_enum! {
    pub enum PlanType {
        RaceSpecific => "race_specific",
        BaseBuilding => "base_building",
        Bridge => "bridge",
        Recovery => "recovery",
    }
}

text_enum! {
    /// Periodisation block of a training plan
    pub enum PhaseKind {
        Base => "base",
        Build => "build",
        Peak => "peak",
        Taper => "taper",
        Recovery => "recovery",
    }
}

text_enum! {
    pub enum WorkoutStatus {
        Planned => "planned",
        Completed => "completed",
        Skipped => "skipped",
    }
}

text_enum! {
    pub enum WorkoutCategory {
        Easy => "easy",
        Tempo => "tempo",
        Interval => "interval",
        LongRun => "long_run",
        RaceSimulation => "race_simulation",
        Recovery => "recovery",
        Strength => "strength",
        CrossTraining => "cross_training",
        Rest => "rest",
    }
}

impl WorkoutCategory {
    /// Whether the category involves running (as opposed to gym or rest days)
    pub fn is_running(&self) -> bool {
        !matches!(
            self,
            WorkoutCategory::Strength | WorkoutCategory::CrossTraining | WorkoutCategory::Rest
        )
    }
}

text_enum! {
    pub enum WorkoutSource {
        Planned => "planned",
        Manual => "manual",
        Import => "import",
    }
}

text_enum! {
    pub enum MessageContext {
        General => "general",
        WorkoutFeedback => "workout_feedback",
        WorkoutModification => "workout_modification",
    }
}

text_enum! {
    pub enum NotificationType {
        Message => "message",
        Workout => "workout",
        Comment => "comment",
        CoachInvitation => "coach_invitation",
        Relationship => "relationship",
        TrainingPlan => "training_plan",
        RaceImport => "race_import",
        System => "system",
    }
}

text_enum! {
    pub enum Units {
        Imperial => "imperial",
        Metric => "metric",
    }
}

// ========================================
// Entities
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

/// Application user (credentials live in separate columns and never leave the db layer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for User {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_column(row, "id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            role: enum_column(row, "role")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Session {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_column(row, "id")?,
            user_id: uuid_column(row, "user_id")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Per-type notification switches; types absent from the map are enabled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationPreferences(pub BTreeMap<NotificationType, bool>);

impl NotificationPreferences {
    pub fn allows(&self, kind: NotificationType) -> bool {
        self.0.get(&kind).copied().unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: Uuid,
    pub units: Units,
    pub notification_preferences: NotificationPreferences,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for UserSettings {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: uuid_column(row, "user_id")?,
            units: enum_column(row, "units")?,
            notification_preferences: json_column(row, "notification_preferences")?
                .unwrap_or_default(),
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Coach ↔ runner relationship (`coach_runners` table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachRunner {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub runner_id: Uuid,
    pub status: RelationshipStatus,
    pub relationship_type: RelationshipType,
    pub invited_by: Role,
    pub notes: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CoachRunner {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.coach_id == user_id || self.runner_id == user_id
    }

    /// The participant that did not send the invitation
    pub fn invitee(&self) -> Uuid {
        match self.invited_by {
            Role::Coach => self.runner_id,
            Role::Runner => self.coach_id,
        }
    }

    /// The other participant, seen from `user_id`
    pub fn partner_of(&self, user_id: Uuid) -> Uuid {
        if self.coach_id == user_id {
            self.runner_id
        } else {
            self.coach_id
        }
    }
}

impl<'r> FromRow<'r, SqliteRow> for CoachRunner {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_column(row, "id")?,
            coach_id: uuid_column(row, "coach_id")?,
            runner_id: uuid_column(row, "runner_id")?,
            status: enum_column(row, "status")?,
            relationship_type: enum_column(row, "relationship_type")?,
            invited_by: enum_column(row, "invited_by")?,
            notes: row.try_get("notes")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Race {
    pub id: Uuid,
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
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Race {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_column(row, "id")?,
            name: row.try_get("name")?,
            date: row.try_get("date")?,
            distance_miles: row.try_get("distance_miles")?,
            distance_type: enum_column(row, "distance_type")?,
            location: row.try_get("location")?,
            elevation_gain_feet: row.try_get("elevation_gain_feet")?,
            terrain_type: enum_column(row, "terrain_type")?,
            website_url: row.try_get("website_url")?,
            notes: row.try_get("notes")?,
            import_source: enum_column(row, "import_source")?,
            created_by: uuid_column(row, "created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingPlan {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub coach_id: Uuid,
    pub runner_id: Uuid,
    pub target_race_id: Option<Uuid>,
    pub goal_type: GoalType,
    pub plan_type: PlanType,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrainingPlan {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.coach_id == user_id || self.runner_id == user_id
    }
}

impl<'r> FromRow<'r, SqliteRow> for TrainingPlan {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_column(row, "id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            coach_id: uuid_column(row, "coach_id")?,
            runner_id: uuid_column(row, "runner_id")?,
            target_race_id: opt_uuid_column(row, "target_race_id")?,
            goal_type: enum_column(row, "goal_type")?,
            plan_type: enum_column(row, "plan_type")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            archived: row.try_get("archived")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanPhase {
    pub id: Uuid,
    pub training_plan_id: Uuid,
    pub phase: PhaseKind,
    pub phase_order: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl<'r> FromRow<'r, SqliteRow> for PlanPhase {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_column(row, "id")?,
            training_plan_id: uuid_column(row, "training_plan_id")?,
            phase: enum_column(row, "phase")?,
            phase_order: row.try_get("phase_order")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workout {
    pub id: Uuid,
    pub training_plan_id: Option<Uuid>,
    pub runner_id: Uuid,
    pub date: NaiveDate,
    pub category: WorkoutCategory,
    pub planned_distance: Option<f64>,
    /// Minutes
    pub planned_duration: Option<i64>,
    pub intensity: Option<i64>,
    pub terrain: Option<TerrainType>,
    pub elevation_gain: Option<f64>,
    pub status: WorkoutStatus,
    pub actual_type: Option<String>,
    pub actual_distance: Option<f64>,
    /// Minutes
    pub actual_duration: Option<i64>,
    pub workout_notes: Option<String>,
    pub injury_notes: Option<String>,
    pub external_id: Option<String>,
    pub source: WorkoutSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Workout {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_column(row, "id")?,
            training_plan_id: opt_uuid_column(row, "training_plan_id")?,
            runner_id: uuid_column(row, "runner_id")?,
            date: row.try_get("date")?,
            category: enum_column(row, "category")?,
            planned_distance: row.try_get("planned_distance")?,
            planned_duration: row.try_get("planned_duration")?,
            intensity: row.try_get("intensity")?,
            terrain: opt_enum_column(row, "terrain")?,
            elevation_gain: row.try_get("elevation_gain")?,
            status: enum_column(row, "status")?,
            actual_type: row.try_get("actual_type")?,
            actual_distance: row.try_get("actual_distance")?,
            actual_duration: row.try_get("actual_duration")?,
            workout_notes: row.try_get("workout_notes")?,
            injury_notes: row.try_get("injury_notes")?,
            external_id: row.try_get("external_id")?,
            source: enum_column(row, "source")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub workout_id: Option<Uuid>,
    pub context_type: MessageContext,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Message {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_column(row, "id")?,
            sender_id: uuid_column(row, "sender_id")?,
            recipient_id: uuid_column(row, "recipient_id")?,
            content: row.try_get("content")?,
            workout_id: opt_uuid_column(row, "workout_id")?,
            context_type: enum_column(row, "context_type")?,
            read: row.try_get("read")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Notification {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_column(row, "id")?,
            user_id: uuid_column(row, "user_id")?,
            notification_type: enum_column(row, "type")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            data: json_column(row, "data")?,
            read: row.try_get("read")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_distance_classification() {
        assert_eq!(DistanceType::classify(31.1), DistanceType::FiftyK);
        assert_eq!(DistanceType::classify(26.2), DistanceType::Marathon);
        assert_eq!(DistanceType::classify(102.5), DistanceType::HundredMile);
        assert_eq!(DistanceType::classify(64.0), DistanceType::HundredK);
        assert_eq!(DistanceType::classify(40.0), DistanceType::Custom);
        assert_eq!(DistanceType::classify(0.0), DistanceType::Custom);
    }

    #[test]
    fn test_enum_text_round_trip_uses_stored_names() {
        assert_eq!(DistanceType::HalfMarathon.as_str(), "Half Marathon");
        assert_eq!(
            WorkoutCategory::from_str("long_run").unwrap(),
            WorkoutCategory::LongRun
        );
        assert!(Role::from_str("admin").is_err());
    }

    #[test]
    fn test_enum_serde_matches_text_form() {
        let json = serde_json::to_string(&DistanceType::HundredMile).unwrap();
        assert_eq!(json, "\"100M\"");
        let parsed: PlanType = serde_json::from_str("\"race_specific\"").unwrap();
        assert_eq!(parsed, PlanType::RaceSpecific);
    }

    #[test]
    fn test_notification_preferences_default_to_enabled() {
        let mut prefs = NotificationPreferences::default();
        assert!(prefs.allows(NotificationType::Message));
        prefs.0.insert(NotificationType::Message, false);
        assert!(!prefs.allows(NotificationType::Message));
        assert!(prefs.allows(NotificationType::Workout));
    }

    #[test]
    fn test_relationship_helpers() {
        let coach = Uuid::new_v4();
        let runner = Uuid::new_v4();
        let rel = CoachRunner {
            id: Uuid::new_v4(),
            coach_id: coach,
            runner_id: runner,
            status: RelationshipStatus::Pending,
            relationship_type: RelationshipType::Standard,
            invited_by: Role::Coach,
            notes: None,
            started_at: None,
            ended_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(rel.invitee(), runner);
        assert_eq!(rel.partner_of(runner), coach);
        assert!(rel.involves(coach));
        assert!(!rel.involves(Uuid::new_v4()));
    }
}
