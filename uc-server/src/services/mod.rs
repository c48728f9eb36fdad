//! Business logic shared by the HTTP handlers and the CLI

pub mod accounts;
pub mod notifier;
pub mod phases;
pub mod race_import;
pub mod seed;
pub mod training;

pub use notifier::Notifier;
pub use race_import::{ImportOptions, ImportReport, RaceImporter};
