//! Server-Sent Events endpoint

use axum::{
    extract::State,
    response::{sse::Event, Sse},
    routing::get,
    Extension, Router,
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::api::AuthUser;
use crate::AppState;

/// GET /api/events
///
/// Live stream of the events the caller is a recipient of.
pub async fn event_stream(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    uc_common::sse::user_event_stream(state.event_bus.subscribe(), auth.id())
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/events", get(event_stream))
}
