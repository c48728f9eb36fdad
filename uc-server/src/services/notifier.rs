//! Notification writer
//!
//! Stores a notification unless the recipient switched the type off, then
//! pushes `NotificationCreated` to their SSE stream.

use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uc_common::db::models::{Notification, NotificationType};
use uc_common::events::{EventBus, UcEvent};
use uc_common::Result;
use uuid::Uuid;

use crate::db;

#[derive(Clone)]
pub struct Notifier {
    db: SqlitePool,
    event_bus: EventBus,
}

impl Notifier {
    pub fn new(db: SqlitePool, event_bus: EventBus) -> Self {
        Self { db, event_bus }
    }

    /// Returns the stored notification, or `None` when the user's preferences suppress it
    pub async fn notify(
        &self,
        user_id: Uuid,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Result<Option<Notification>> {
        let preferences = db::user_settings::get_preferences(&self.db, user_id).await?;
        if !preferences.allows(kind) {
            debug!(user_id = %user_id, kind = %kind, "Notification suppressed by preferences");
            return Ok(None);
        }

        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            notification_type: kind,
            title: title.into(),
            message: message.into(),
            data,
            read: false,
            created_at: uc_common::time::now(),
        };
        db::notifications::insert_notification(&self.db, &notification).await?;

        self.event_bus.emit_lossy(UcEvent::NotificationCreated {
            user_id,
            notification_id: notification.id,
            notification_type: kind,
            title: notification.title.clone(),
            timestamp: notification.created_at,
        });

        Ok(Some(notification))
    }

    /// Like [`notify`](Self::notify) but only logs failures
    ///
    /// Used after the primary write of a request has succeeded, so a
    /// notification problem never turns a completed action into an error.
    pub async fn notify_logged(
        &self,
        user_id: Uuid,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        data: Option<Value>,
    ) {
        if let Err(e) = self.notify(user_id, kind, title, message, data).await {
            warn!(user_id = %user_id, kind = %kind, "Failed to store notification: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uc_common::auth::hash_password;
    use uc_common::db::init_memory_database;
    use uc_common::db::models::{Role, User};

    async fn setup() -> (Notifier, SqlitePool, Uuid) {
        let pool = init_memory_database().await.unwrap();
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "runner@example.com".to_string(),
            name: "Runner".to_string(),
            role: Role::Runner,
            created_at: now,
            updated_at: now,
        };
        db::users::insert_user(&pool, &user, &hash_password("password1"))
            .await
            .unwrap();
        db::user_settings::create_default(&pool, user.id).await.unwrap();
        (Notifier::new(pool.clone(), EventBus::new(16)), pool, user.id)
    }

    #[tokio::test]
    async fn test_notify_stores_and_emits() {
        let (notifier, pool, user_id) = setup().await;
        let mut rx = notifier.event_bus.subscribe();

        let stored = notifier
            .notify(user_id, NotificationType::Workout, "Done", "Workout completed", None)
            .await
            .unwrap()
            .expect("enabled by default");

        let listed = db::notifications::list_notifications(&pool, user_id, true, 10)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, stored.id);

        match rx.try_recv().unwrap() {
            UcEvent::NotificationCreated {
                notification_id, ..
            } => assert_eq!(notification_id, stored.id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disabled_type_is_not_stored() {
        let (notifier, pool, user_id) = setup().await;
        let mut settings = db::user_settings::get_settings(&pool, user_id).await.unwrap();
        settings
            .notification_preferences
            .0
            .insert(NotificationType::Message, false);
        db::user_settings::update_settings(&pool, &settings).await.unwrap();

        let result = notifier
            .notify(user_id, NotificationType::Message, "Hi", "New message", None)
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(db::notifications::list_notifications(&pool, user_id, false, 10)
            .await
            .unwrap()
            .is_empty());
    }
}
