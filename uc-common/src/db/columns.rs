//! Column decoding helpers for TEXT-encoded identifiers, enums and JSON

use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

fn decode_error(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}

/// Decode a hyphenated UUID stored as TEXT
pub fn uuid_column(row: &SqliteRow, column: &str) -> Result<Uuid, sqlx::Error> {
    let text: String = row.try_get(column)?;
    Uuid::parse_str(&text).map_err(|e| decode_error(column, format!("invalid UUID '{}': {}", text, e)))
}

/// Decode a nullable UUID column
pub fn opt_uuid_column(row: &SqliteRow, column: &str) -> Result<Option<Uuid>, sqlx::Error> {
    let text: Option<String> = row.try_get(column)?;
    text.map(|t| {
        Uuid::parse_str(&t).map_err(|e| decode_error(column, format!("invalid UUID '{}': {}", t, e)))
    })
    .transpose()
}

/// Decode a TEXT enum column through its `FromStr` impl
pub fn enum_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = crate::Error>,
{
    let text: String = row.try_get(column)?;
    text.parse::<T>().map_err(|e| decode_error(column, e.to_string()))
}

/// Decode a nullable TEXT enum column
pub fn opt_enum_column<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr<Err = crate::Error>,
{
    let text: Option<String> = row.try_get(column)?;
    text.map(|t| t.parse::<T>().map_err(|e| decode_error(column, e.to_string())))
        .transpose()
}

/// Decode a nullable JSON document stored as TEXT
pub fn json_column<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: DeserializeOwned,
{
    let text: Option<String> = row.try_get(column)?;
    match text {
        None => Ok(None),
        Some(t) if t.trim().is_empty() => Ok(None),
        Some(t) => serde_json::from_str(&t)
            .map(Some)
            .map_err(|e| decode_error(column, format!("invalid JSON: {}", e))),
    }
}
