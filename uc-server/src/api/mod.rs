//! HTTP API handlers

pub mod auth;
pub mod events;
pub mod health;
pub mod messages;
pub mod notifications;
pub mod plans;
pub mod races;
pub mod relationships;
pub mod users;
pub mod workouts;

pub use auth::{auth_middleware, AuthUser};
