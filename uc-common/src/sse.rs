//! Server-Sent Events (SSE) utilities
//!
//! Turns the shared [`EventBus`](crate::events::EventBus) into a per-user
//! SSE stream. Only events whose recipients include the user are forwarded.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::UcEvent;

/// Interval between keep-alive comments
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Build the SSE response for one signed-in user
///
/// Sends a `ConnectionStatus` event first, then every visible [`UcEvent`]
/// as JSON with the event name in the SSE `event:` field. A lagging
/// receiver skips the events it missed and keeps streaming.
pub fn user_event_stream(
    mut rx: broadcast::Receiver<UcEvent>,
    user_id: Uuid,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected for user {}", user_id);

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !event.is_visible_to(user_id) {
                        continue;
                    }
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            debug!("SSE: {} -> {}", event.event_type(), user_id);
                            yield Ok(Event::default().event(event.event_type()).data(json));
                        }
                        Err(e) => warn!("SSE: failed to serialize {}: {}", event.event_type(), e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE: client {} lagged, skipped {} events", user_id, skipped);
                }
                Err(RecvError::Closed) => {
                    info!("SSE: event bus closed, ending stream for {}", user_id);
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
