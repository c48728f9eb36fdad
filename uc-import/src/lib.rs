//! # UltraCoach Import Library
//!
//! Pure race and activity import logic shared by the HTTP API and the CLI:
//! - Format detection (GPX or CSV)
//! - GPX route summaries (distance, elevation, start point)
//! - CSV parsing with fuzzy header matching and date-format guessing
//! - Race and workout de-duplication
//!
//! Nothing here touches the database; callers load the existing rows and
//! persist the resulting drafts.

pub mod csv;
pub mod dates;
pub mod dedup;
pub mod detect;
pub mod error;
pub mod geo;
pub mod gpx;
pub mod headers;
pub mod types;

pub use error::{ImportError, Result};
pub use types::*;
