//! Coach/runner messaging endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uc_common::db::models::{CoachRunner, Message, MessageContext, NotificationType};
use uc_common::db::get_setting_or;
use uc_common::events::UcEvent;
use uuid::Uuid;

use crate::api::users::PublicProfile;
use crate::api::AuthUser;
use crate::db;
use crate::db::messages::ConversationSummary;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub const MAX_MESSAGE_CHARS: usize = 2000;
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// Longest message preview put in a notification
const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub recipient_id: Uuid,
    pub content: String,
    pub workout_id: Option<Uuid>,
    pub context_type: Option<MessageContext>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TypingRequest {
    pub is_typing: bool,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct ConversationView {
    #[serde(flatten)]
    pub summary: ConversationSummary,
    pub partner: Option<PublicProfile>,
}

/// Trimmed content of 1..=2000 characters
pub fn validate_content(content: &str) -> ApiResult<String> {
    let content = content.trim();
    let chars = content.chars().count();
    if chars == 0 || chars > MAX_MESSAGE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Message must be between 1 and {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(content.to_string())
}

fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        content.to_string()
    } else {
        let cut: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{}…", cut)
    }
}

async fn require_active_pair(state: &AppState, a: Uuid, b: Uuid) -> ApiResult<CoachRunner> {
    db::relationships::find_active_between(&state.db, a, b)
        .await?
        .ok_or_else(|| {
            ApiError::Forbidden("Messaging requires an active coaching relationship".to_string())
        })
}

/// POST /api/messages
pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let content = validate_content(&req.content)?;
    let rel = require_active_pair(&state, auth.id(), req.recipient_id).await?;

    if let Some(workout_id) = req.workout_id {
        let workout = db::workouts::get_workout(&state.db, workout_id)
            .await?
            .ok_or_else(|| ApiError::BadRequest(format!("Workout {} does not exist", workout_id)))?;
        if workout.runner_id != rel.runner_id {
            return Err(ApiError::BadRequest(
                "Workout does not belong to this conversation's runner".to_string(),
            ));
        }
    }

    let context_type = req.context_type.unwrap_or(if req.workout_id.is_some() {
        MessageContext::WorkoutFeedback
    } else {
        MessageContext::General
    });
    let message = Message {
        id: Uuid::new_v4(),
        sender_id: auth.id(),
        recipient_id: req.recipient_id,
        content,
        workout_id: req.workout_id,
        context_type,
        read: false,
        created_at: Utc::now(),
    };
    db::messages::insert_message(&state.db, &message).await?;
    debug!(message_id = %message.id, sender_id = %message.sender_id, "Message stored");

    state
        .notifier()
        .notify_logged(
            message.recipient_id,
            NotificationType::Message,
            format!("New message from {}", auth.user.name),
            preview(&message.content),
            Some(json!({ "message_id": message.id, "sender_id": message.sender_id })),
        )
        .await;
    state.event_bus.emit_lossy(UcEvent::MessageSent {
        message_id: message.id,
        sender_id: message.sender_id,
        recipient_id: message.recipient_id,
        timestamp: message.created_at,
    });

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/messages/:partner_id
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(partner_id): Path<Uuid>,
    Query(query): Query<ConversationQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let default_limit =
        get_setting_or(&state.db, "conversation_page_size", DEFAULT_PAGE_SIZE).await?;
    let limit = query.limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE);

    let messages =
        db::messages::conversation(&state.db, auth.id(), partner_id, query.before, limit).await?;
    Ok(Json(messages))
}

/// POST /api/messages/:partner_id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(partner_id): Path<Uuid>,
) -> ApiResult<Json<ReadResponse>> {
    let count = db::messages::mark_read(&state.db, auth.id(), partner_id).await?;
    if count > 0 {
        info!(reader_id = %auth.id(), partner_id = %partner_id, count, "Messages read");
        state.event_bus.emit_lossy(UcEvent::MessagesRead {
            reader_id: auth.id(),
            partner_id,
            count,
            timestamp: Utc::now(),
        });
    }
    Ok(Json(ReadResponse { count }))
}

/// POST /api/messages/:partner_id/typing
pub async fn typing(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(partner_id): Path<Uuid>,
    Json(req): Json<TypingRequest>,
) -> ApiResult<StatusCode> {
    require_active_pair(&state, auth.id(), partner_id).await?;
    state.event_bus.emit_lossy(UcEvent::TypingStatus {
        user_id: auth.id(),
        partner_id,
        is_typing: req.is_typing,
        timestamp: Utc::now(),
    });
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<ConversationView>>> {
    let summaries = db::messages::conversations(&state.db, auth.id()).await?;
    let mut views = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let partner = db::users::get_user(&state.db, summary.partner_id)
            .await?
            .map(|u| PublicProfile::from(&u));
        views.push(ConversationView { summary, partner });
    }
    Ok(Json(views))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/messages", post(send_message))
        .route("/api/messages/:partner_id", get(get_conversation))
        .route("/api/messages/:partner_id/read", post(mark_read))
        .route("/api/messages/:partner_id/typing", post(typing))
        .route("/api/conversations", get(list_conversations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_bounds() {
        assert_eq!(validate_content("  see you at the track  ").unwrap(), "see you at the track");
        assert!(validate_content(" \n ").is_err());
        assert!(validate_content(&"a".repeat(MAX_MESSAGE_CHARS)).is_ok());
        assert!(validate_content(&"a".repeat(MAX_MESSAGE_CHARS + 1)).is_err());
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(PREVIEW_CHARS + 5);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 1);
        assert!(p.ends_with('…'));
        assert_eq!(preview("short"), "short");
    }
}
