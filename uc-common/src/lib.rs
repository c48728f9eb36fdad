//! # UltraCoach Common Library
//!
//! Shared code for the UltraCoach server and import tooling including:
//! - Database models, schema and migrations
//! - Event types (UcEvent enum) and the EventBus
//! - Configuration loading
//! - Credential hashing and session tokens
//! - Utility functions

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
