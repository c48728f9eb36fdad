//! Event types for the UltraCoach event system
//!
//! Provides the shared event definitions and the EventBus used to fan events
//! out to SSE subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::db::models::{NotificationType, RelationshipStatus, WorkoutStatus};

/// UltraCoach event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// Every event names the users allowed to observe it (see [`UcEvent::recipients`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UcEvent {
    /// A notification row was stored for a user
    NotificationCreated {
        user_id: Uuid,
        notification_id: Uuid,
        notification_type: NotificationType,
        title: String,
        timestamp: DateTime<Utc>,
    },

    /// A chat message was sent
    MessageSent {
        message_id: Uuid,
        sender_id: Uuid,
        recipient_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// `reader_id` read the messages `partner_id` had sent them
    MessagesRead {
        reader_id: Uuid,
        partner_id: Uuid,
        count: u64,
        timestamp: DateTime<Utc>,
    },

    /// Typing indicator (not persisted)
    TypingStatus {
        user_id: Uuid,
        partner_id: Uuid,
        is_typing: bool,
        timestamp: DateTime<Utc>,
    },

    /// A workout was completed, skipped or edited
    WorkoutUpdated {
        workout_id: Uuid,
        runner_id: Uuid,
        coach_id: Option<Uuid>,
        status: WorkoutStatus,
        timestamp: DateTime<Utc>,
    },

    /// A coach/runner relationship changed state
    RelationshipChanged {
        relationship_id: Uuid,
        coach_id: Uuid,
        runner_id: Uuid,
        status: RelationshipStatus,
        timestamp: DateTime<Utc>,
    },

    /// A race import finished
    RacesImported {
        user_id: Uuid,
        imported: usize,
        duplicates: usize,
        timestamp: DateTime<Utc>,
    },
}

impl UcEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            UcEvent::NotificationCreated { .. } => "NotificationCreated",
            UcEvent::MessageSent { .. } => "MessageSent",
            UcEvent::MessagesRead { .. } => "MessagesRead",
            UcEvent::TypingStatus { .. } => "TypingStatus",
            UcEvent::WorkoutUpdated { .. } => "WorkoutUpdated",
            UcEvent::RelationshipChanged { .. } => "RelationshipChanged",
            UcEvent::RacesImported { .. } => "RacesImported",
        }
    }

    /// Users that may observe this event
    pub fn recipients(&self) -> Vec<Uuid> {
        match self {
            UcEvent::NotificationCreated { user_id, .. } => vec![*user_id],
            UcEvent::MessageSent {
                sender_id,
                recipient_id,
                ..
            } => vec![*sender_id, *recipient_id],
            // The partner learns their messages were read
            UcEvent::MessagesRead { partner_id, .. } => vec![*partner_id],
            UcEvent::TypingStatus { partner_id, .. } => vec![*partner_id],
            UcEvent::WorkoutUpdated {
                runner_id,
                coach_id,
                ..
            } => {
                let mut users = vec![*runner_id];
                users.extend(coach_id.iter().copied());
                users
            }
            UcEvent::RelationshipChanged {
                coach_id,
                runner_id,
                ..
            } => vec![*coach_id, *runner_id],
            UcEvent::RacesImported { user_id, .. } => vec![*user_id],
        }
    }

    pub fn is_visible_to(&self, user_id: Uuid) -> bool {
        self.recipients().contains(&user_id)
    }
}

/// Central event distribution bus
///
/// Thin wrapper over a tokio broadcast channel. Slow subscribers lose the
/// oldest events (they receive `RecvError::Lagged`) rather than blocking emitters.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<UcEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use uc_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<UcEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: UcEvent) -> Result<usize, broadcast::error::SendError<UcEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Every UltraCoach event is also persisted or recomputable, so a missed
    /// live update is never data loss.
    pub fn emit_lossy(&self, event: UcEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::trace!("No SSE subscribers for {}", e.0.event_type());
        }
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_event_visible_to_both_parties_only() {
        let sender = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let event = UcEvent::MessageSent {
            message_id: Uuid::new_v4(),
            sender_id: sender,
            recipient_id: recipient,
            timestamp: Utc::now(),
        };

        assert!(event.is_visible_to(sender));
        assert!(event.is_visible_to(recipient));
        assert!(!event.is_visible_to(Uuid::new_v4()));
    }

    #[test]
    fn test_workout_event_without_coach() {
        let runner = Uuid::new_v4();
        let event = UcEvent::WorkoutUpdated {
            workout_id: Uuid::new_v4(),
            runner_id: runner,
            coach_id: None,
            status: WorkoutStatus::Completed,
            timestamp: Utc::now(),
        };
        assert_eq!(event.recipients(), vec![runner]);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = UcEvent::RacesImported {
            user_id: Uuid::new_v4(),
            imported: 3,
            duplicates: 1,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "RacesImported");
        assert_eq!(json["imported"], 3);
    }

    #[tokio::test]
    async fn test_emit_requires_subscriber() {
        let bus = EventBus::new(8);
        let event = UcEvent::TypingStatus {
            user_id: Uuid::new_v4(),
            partner_id: Uuid::new_v4(),
            is_typing: true,
            timestamp: Utc::now(),
        };

        assert!(bus.emit(event.clone()).is_err());

        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.emit(event).unwrap(), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "TypingStatus");
    }
}
