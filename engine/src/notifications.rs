// Notification dispatch for workflow actions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

/// What a workflow notification is about. The variant is picked from the
/// kind of record that triggered the workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationPayload {
    ActivityDue {
        activity_id: Uuid,
        subject: String,
    },
    DealStatus {
        deal_id: Uuid,
        title: String,
        status: String,
    },
}

/// Delivers notifications to users. Fire-and-forget: delivery failures are
/// logged by the implementation and never reach the workflow engine.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, user_id: Uuid, payload: NotificationPayload);
}

/// Writes notifications to the `notifications` table, where the host
/// application's notification center picks them up.
pub struct PgNotificationDispatcher {
    pool: PgPool,
}

impl PgNotificationDispatcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationDispatcher for PgNotificationDispatcher {
    async fn notify(&self, user_id: Uuid, payload: NotificationPayload) {
        let (title, message, notification_type, entity_type, entity_id) = match &payload {
            NotificationPayload::ActivityDue {
                activity_id,
                subject,
            } => (
                "Activity due",
                format!("Activity '{}' is due", subject),
                "warning",
                "activity",
                *activity_id,
            ),
            NotificationPayload::DealStatus {
                deal_id,
                title,
                status,
            } => (
                "Deal updated",
                format!("Deal '{}' is now {}", title, status),
                "info",
                "deal",
                *deal_id,
            ),
        };

        let outcome = sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, title, message, notification_type, entity_type, entity_id, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, false, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .bind(message)
        .bind(notification_type)
        .bind(entity_type)
        .bind(entity_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = outcome {
            error!(%user_id, error = %e, "Failed to deliver workflow notification");
        }
    }
}
