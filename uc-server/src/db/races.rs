//! Race persistence

use chrono::Utc;
use sqlx::{FromRow, Sqlite, SqlitePool};
use uc_common::db::models::Race;
use uc_common::{Error, Result};
use uuid::Uuid;

const RACE_COLUMNS: &str = "id, name, date, distance_miles, distance_type, location, \
     elevation_gain_feet, terrain_type, website_url, notes, import_source, created_by, \
     created_at, updated_at";

/// Insert a race (usable inside an import transaction)
pub async fn insert_race<'e, E>(executor: E, race: &Race) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO races
            (id, name, date, distance_miles, distance_type, location, elevation_gain_feet,
             terrain_type, website_url, notes, import_source, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(race.id.to_string())
    .bind(&race.name)
    .bind(race.date)
    .bind(race.distance_miles)
    .bind(race.distance_type.as_str())
    .bind(&race.location)
    .bind(race.elevation_gain_feet)
    .bind(race.terrain_type.as_str())
    .bind(&race.website_url)
    .bind(&race.notes)
    .bind(race.import_source.as_str())
    .bind(race.created_by.to_string())
    .bind(race.created_at)
    .bind(race.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn get_race(pool: &SqlitePool, id: Uuid) -> Result<Option<Race>> {
    let row = sqlx::query(&format!("SELECT {} FROM races WHERE id = ?", RACE_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| Race::from_row(&r)).transpose()?)
}

pub async fn require_race(pool: &SqlitePool, id: Uuid) -> Result<Race> {
    get_race(pool, id)
        .await?
        .ok_or_else(|| Error::not_found("Race", id))
}

fn search_pattern(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.to_lowercase()))
}

const SEARCH_CLAUSE: &str = " WHERE (lower(name) LIKE ? OR lower(location) LIKE ?)";

/// Number of races matching an optional name/location search
pub async fn count_races(pool: &SqlitePool, search: Option<&str>) -> Result<i64> {
    let pattern = search_pattern(search);
    let mut sql = "SELECT COUNT(*) FROM races".to_string();
    if pattern.is_some() {
        sql.push_str(SEARCH_CLAUSE);
    }

    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(p) = &pattern {
        query = query.bind(p.clone()).bind(p.clone());
    }
    Ok(query.fetch_one(pool).await?)
}

/// One page of races ordered by date then name (undated races last)
pub async fn list_races(
    pool: &SqlitePool,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Race>> {
    let pattern = search_pattern(search);
    let mut sql = format!("SELECT {} FROM races", RACE_COLUMNS);
    if pattern.is_some() {
        sql.push_str(SEARCH_CLAUSE);
    }
    sql.push_str(" ORDER BY date IS NULL, date, name LIMIT ? OFFSET ?");

    let mut query = sqlx::query(&sql);
    if let Some(p) = &pattern {
        query = query.bind(p.clone()).bind(p.clone());
    }
    let rows = query.bind(limit).bind(offset).fetch_all(pool).await?;

    rows.iter()
        .map(|r| Race::from_row(r).map_err(Error::from))
        .collect()
}

/// Every stored race (duplicate detection compares against all of them)
pub async fn all_races(pool: &SqlitePool) -> Result<Vec<Race>> {
    let rows = sqlx::query(&format!("SELECT {} FROM races", RACE_COLUMNS))
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|r| Race::from_row(r).map_err(Error::from))
        .collect()
}

pub async fn update_race(pool: &SqlitePool, race: &Race) -> Result<Race> {
    sqlx::query(
        r#"
        UPDATE races SET
            name = ?, date = ?, distance_miles = ?, distance_type = ?, location = ?,
            elevation_gain_feet = ?, terrain_type = ?, website_url = ?, notes = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&race.name)
    .bind(race.date)
    .bind(race.distance_miles)
    .bind(race.distance_type.as_str())
    .bind(&race.location)
    .bind(race.elevation_gain_feet)
    .bind(race.terrain_type.as_str())
    .bind(&race.website_url)
    .bind(&race.notes)
    .bind(Utc::now())
    .bind(race.id.to_string())
    .execute(pool)
    .await?;

    require_race(pool, race.id).await
}

pub async fn delete_race(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM races WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Whether any training plan targets the race
pub async fn is_targeted(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM training_plans WHERE target_race_id = ?")
        .bind(id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}
