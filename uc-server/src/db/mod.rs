//! Database access layer for uc-server
//!
//! One module per table family. Functions take the pool, or a generic
//! executor where callers need to run them inside a transaction.

pub mod messages;
pub mod notifications;
pub mod plans;
pub mod races;
pub mod relationships;
pub mod sessions;
pub mod user_settings;
pub mod users;
pub mod workouts;

use uc_common::Error;

/// Map a UNIQUE constraint violation to `Conflict`, anything else to `Database`
pub(crate) fn unique_violation(err: sqlx::Error, message: impl Into<String>) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Error::Conflict(message.into())
        }
        _ => Error::Database(err),
    }
}
