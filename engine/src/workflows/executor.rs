// Action Executor - runs a single workflow action against the trigger

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use relay_shared::{Activity, Entity};

use super::actions::{resolve_template, Action, ActionResult};
use super::conditions::parse_date_str;
use super::triggers::TriggerData;
use crate::error::EngineResult;
use crate::notifications::{NotificationDispatcher, NotificationPayload};
use crate::storage::EntityStore;

const USER_NOT_IN_TENANT: &str = "User not found or not in same tenant";

pub struct ActionExecutor {
    entities: Arc<dyn EntityStore>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl ActionExecutor {
    pub fn new(entities: Arc<dyn EntityStore>, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self { entities, notifier }
    }

    /// Executes one action. Never fails upward: parameter problems, records
    /// of the wrong kind, cross-tenant targets and storage errors all come
    /// back as a failure result so the engine can keep running the
    /// remaining actions and log what happened.
    ///
    /// Persisted mutations are written back into `data`, so later actions
    /// in the same run (and their templates) see the updated record.
    pub async fn execute(
        &self,
        action: &Action,
        data: &mut TriggerData,
        tenant_id: Uuid,
    ) -> ActionResult {
        info!(action = action.kind(), entity = %data.entity.kind(), "Executing workflow action");

        let result = match action {
            Action::CreateActivity {
                subject,
                description,
                due_date,
                priority,
                assigned_to,
            } => {
                self.create_activity(
                    subject,
                    description.as_deref(),
                    due_date.as_deref(),
                    priority.as_deref(),
                    *assigned_to,
                    data,
                    tenant_id,
                )
                .await
            }
            Action::UpdateDealStatus { status } => self.update_deal_status(status, data).await,
            Action::AssignUser { user_id } => self.assign_user(*user_id, data, tenant_id).await,
            Action::SendNotification { user_id, status } => {
                self.send_notification(*user_id, status.as_deref(), data, tenant_id)
                    .await
            }
        };

        match result {
            Ok(r) => r,
            Err(e) => {
                error!(action = action.kind(), error = %e, "Workflow action failed");
                ActionResult::failure(action.kind(), e.to_string())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_activity(
        &self,
        subject: &str,
        description: Option<&str>,
        due_date: Option<&str>,
        priority: Option<&str>,
        assigned_to: Option<Uuid>,
        data: &TriggerData,
        tenant_id: Uuid,
    ) -> EngineResult<ActionResult> {
        let entity = &data.entity;
        let due = due_date
            .map(|template| resolve_template(template, data))
            .and_then(|resolved| parse_date_str(&resolved));

        let activity = Activity {
            id: Uuid::new_v4(),
            tenant_id,
            subject: resolve_template(subject, data),
            description: description.map(|d| resolve_template(d, data)),
            activity_type: "task".to_string(),
            status: "pending".to_string(),
            priority: priority.unwrap_or("medium").to_string(),
            due_date: due,
            related_type: Some(entity.kind().as_str().to_string()),
            related_id: Some(entity.id()),
            assigned_to: assigned_to.or(entity.assigned_to()),
            created_by: entity.created_by(),
            created_at: Utc::now(),
            updated_at: None,
        };
        self.entities.insert_activity(&activity).await?;

        Ok(ActionResult::success(
            "create_activity",
            json!({
                "activity_id": activity.id,
                "subject": activity.subject,
            }),
        ))
    }

    async fn update_deal_status(
        &self,
        status: &str,
        data: &mut TriggerData,
    ) -> EngineResult<ActionResult> {
        let Entity::Deal(deal) = &data.entity else {
            return Ok(ActionResult::failure(
                "update_deal_status",
                format!("Triggering record is a {}, not a deal", data.entity.kind()),
            ));
        };

        let mut updated = deal.clone();
        updated.status = status.to_string();
        updated.updated_at = Some(Utc::now());
        let deal_id = updated.id;
        self.entities.update(&Entity::Deal(updated.clone())).await?;
        data.entity = Entity::Deal(updated);

        Ok(ActionResult::success(
            "update_deal_status",
            json!({
                "deal_id": deal_id,
                "new_status": status,
            }),
        ))
    }

    async fn assign_user(
        &self,
        user_id: Uuid,
        data: &mut TriggerData,
        tenant_id: Uuid,
    ) -> EngineResult<ActionResult> {
        let user = self.entities.find_user(user_id).await?;
        let Some(user) = user.filter(|u| u.tenant_id == tenant_id) else {
            return Ok(ActionResult::failure("assign_user", USER_NOT_IN_TENANT));
        };

        let mut entity = data.entity.clone();
        if !entity.set_assigned_to(user.id) {
            return Ok(ActionResult::failure(
                "assign_user",
                format!("{} records cannot be assigned", entity.kind()),
            ));
        }
        self.entities.update(&entity).await?;
        let entity_id = entity.id();
        data.entity = entity;

        Ok(ActionResult::success(
            "assign_user",
            json!({
                "entity_id": entity_id,
                "user_id": user.id,
            }),
        ))
    }

    async fn send_notification(
        &self,
        user_id: Option<Uuid>,
        status: Option<&str>,
        data: &TriggerData,
        tenant_id: Uuid,
    ) -> EngineResult<ActionResult> {
        let target = user_id
            .or_else(|| data.entity.assigned_to())
            .or_else(|| data.entity.created_by());
        let Some(target) = target else {
            return Ok(ActionResult::failure(
                "send_notification",
                "No target user for notification",
            ));
        };

        let user = self.entities.find_user(target).await?;
        let Some(user) = user.filter(|u| u.tenant_id == tenant_id) else {
            return Ok(ActionResult::failure("send_notification", USER_NOT_IN_TENANT));
        };

        let payload = match &data.entity {
            Entity::Activity(a) => Some(NotificationPayload::ActivityDue {
                activity_id: a.id,
                subject: a.subject.clone(),
            }),
            Entity::Deal(d) => Some(NotificationPayload::DealStatus {
                deal_id: d.id,
                title: d.title.clone(),
                status: status.unwrap_or("updated").to_string(),
            }),
            // Other kinds have no notification shape; still a success.
            _ => None,
        };

        let dispatched = payload.is_some();
        if let Some(payload) = payload {
            self.notifier.notify(user.id, payload).await;
        }

        Ok(ActionResult::success(
            "send_notification",
            json!({
                "user_id": user.id,
                "dispatched": dispatched,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryEntityStore, RecordingDispatcher};
    use relay_shared::{Deal, EntityKind, Lead, User};
    use rust_decimal::Decimal;

    fn user(tenant_id: Uuid) -> User {
        User {
            id: Uuid::new_v4(),
            tenant_id,
            name: "Riley".to_string(),
            email: "riley@example.com".to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn deal(tenant_id: Uuid, assigned_to: Option<Uuid>) -> Deal {
        Deal {
            id: Uuid::new_v4(),
            tenant_id,
            title: "Acme Deal".to_string(),
            status: "open".to_string(),
            amount: Decimal::new(150000, 2),
            currency: "USD".to_string(),
            expected_close_date: None,
            lead_id: None,
            assigned_to,
            created_by: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn harness() -> (Arc<InMemoryEntityStore>, Arc<RecordingDispatcher>, ActionExecutor) {
        let entities = Arc::new(InMemoryEntityStore::new());
        let notifier = Arc::new(RecordingDispatcher::new());
        let executor = ActionExecutor::new(entities.clone(), notifier.clone());
        (entities, notifier, executor)
    }

    #[tokio::test]
    async fn test_create_activity_resolves_templates_and_defaults() {
        let (entities, _, executor) = harness();
        let tenant_id = Uuid::new_v4();
        let assignee = Uuid::new_v4();
        let deal = deal(tenant_id, Some(assignee));
        let deal_id = deal.id;
        let mut data = TriggerData::new(Entity::Deal(deal));

        let action = Action::create_activity("Follow up on {{title}}");
        let result = executor.execute(&action, &mut data, tenant_id).await;

        assert!(result.success);
        assert_eq!(result.action_type.as_deref(), Some("create_activity"));
        let output = result.output.unwrap();
        assert!(output.get("activity_id").is_some());

        let created = entities.activities();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].subject, "Follow up on Acme Deal");
        assert_eq!(created[0].status, "pending");
        assert_eq!(created[0].priority, "medium");
        assert_eq!(created[0].related_type.as_deref(), Some("deal"));
        assert_eq!(created[0].related_id, Some(deal_id));
        assert_eq!(created[0].assigned_to, Some(assignee));
    }

    #[tokio::test]
    async fn test_update_deal_status_rejects_non_deals() {
        let (_, _, executor) = harness();
        let tenant_id = Uuid::new_v4();
        let lead = Lead {
            id: Uuid::new_v4(),
            tenant_id,
            title: "Inbound".to_string(),
            company: None,
            email: None,
            phone: None,
            status: "new".to_string(),
            source: None,
            estimated_value: None,
            assigned_to: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        let mut data = TriggerData::new(Entity::Lead(lead));

        let result = executor
            .execute(&Action::update_deal_status("won"), &mut data, tenant_id)
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not a deal"));
    }

    #[tokio::test]
    async fn test_update_deal_status_persists() {
        let (entities, _, executor) = harness();
        let tenant_id = Uuid::new_v4();
        let deal = deal(tenant_id, None);
        let deal_id = deal.id;
        entities.add(Entity::Deal(deal.clone()));
        let mut data = TriggerData::new(Entity::Deal(deal));

        let result = executor
            .execute(&Action::update_deal_status("won"), &mut data, tenant_id)
            .await;
        assert!(result.success);

        let stored = entities
            .find(EntityKind::Deal, deal_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status(), Some("won"));
        // The working copy sees the mutation too
        assert_eq!(data.entity.status(), Some("won"));
    }

    #[tokio::test]
    async fn test_assign_user_rejects_cross_tenant() {
        let (entities, _, executor) = harness();
        let tenant_id = Uuid::new_v4();
        let outsider = user(Uuid::new_v4());
        entities.add_user(outsider.clone());
        let deal = deal(tenant_id, None);
        let deal_id = deal.id;
        entities.add(Entity::Deal(deal.clone()));
        let mut data = TriggerData::new(Entity::Deal(deal));

        let result = executor
            .execute(&Action::assign_user(outsider.id), &mut data, tenant_id)
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(USER_NOT_IN_TENANT));

        // No mutation on rejection
        let stored = entities
            .find(EntityKind::Deal, deal_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.assigned_to(), None);
    }

    #[tokio::test]
    async fn test_assign_user_same_tenant() {
        let (entities, _, executor) = harness();
        let tenant_id = Uuid::new_v4();
        let teammate = user(tenant_id);
        entities.add_user(teammate.clone());
        let deal = deal(tenant_id, None);
        let deal_id = deal.id;
        entities.add(Entity::Deal(deal.clone()));
        let mut data = TriggerData::new(Entity::Deal(deal));

        let result = executor
            .execute(&Action::assign_user(teammate.id), &mut data, tenant_id)
            .await;
        assert!(result.success);

        let stored = entities
            .find(EntityKind::Deal, deal_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.assigned_to(), Some(teammate.id));
        assert_eq!(data.entity.assigned_to(), Some(teammate.id));
    }

    #[tokio::test]
    async fn test_send_notification_for_deal() {
        let (entities, notifier, executor) = harness();
        let tenant_id = Uuid::new_v4();
        let teammate = user(tenant_id);
        entities.add_user(teammate.clone());
        let deal = deal(tenant_id, Some(teammate.id));
        let deal_id = deal.id;
        let mut data = TriggerData::new(Entity::Deal(deal));

        let action = Action::SendNotification {
            user_id: None,
            status: Some("won".to_string()),
        };
        let result = executor.execute(&action, &mut data, tenant_id).await;
        assert!(result.success);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, teammate.id);
        assert_eq!(
            sent[0].1,
            NotificationPayload::DealStatus {
                deal_id,
                title: "Acme Deal".to_string(),
                status: "won".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_send_notification_for_activity() {
        let (entities, notifier, executor) = harness();
        let tenant_id = Uuid::new_v4();
        let teammate = user(tenant_id);
        entities.add_user(teammate.clone());
        let activity = Activity {
            id: Uuid::new_v4(),
            tenant_id,
            subject: "Renewal call".to_string(),
            description: None,
            activity_type: "task".to_string(),
            status: "pending".to_string(),
            priority: "high".to_string(),
            due_date: Some(Utc::now()),
            related_type: None,
            related_id: None,
            assigned_to: Some(teammate.id),
            created_by: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        let activity_id = activity.id;
        let mut data = TriggerData::new(Entity::Activity(activity));

        let result = executor
            .execute(&Action::send_notification(None), &mut data, tenant_id)
            .await;
        assert!(result.success);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, teammate.id);
        assert_eq!(
            sent[0].1,
            NotificationPayload::ActivityDue {
                activity_id,
                subject: "Renewal call".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_send_notification_noop_for_unsupported_kind() {
        let (entities, notifier, executor) = harness();
        let tenant_id = Uuid::new_v4();
        let teammate = user(tenant_id);
        entities.add_user(teammate.clone());
        let lead = Lead {
            id: Uuid::new_v4(),
            tenant_id,
            title: "Inbound".to_string(),
            company: None,
            email: None,
            phone: None,
            status: "new".to_string(),
            source: None,
            estimated_value: None,
            assigned_to: Some(teammate.id),
            created_by: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        let mut data = TriggerData::new(Entity::Lead(lead));

        let result = executor
            .execute(&Action::send_notification(None), &mut data, tenant_id)
            .await;
        assert!(result.success);
        assert!(notifier.sent().is_empty());
        assert_eq!(result.output.unwrap()["dispatched"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn test_storage_error_becomes_failure_result() {
        let (entities, _, executor) = harness();
        let tenant_id = Uuid::new_v4();
        let mut data = TriggerData::new(Entity::Deal(deal(tenant_id, None)));
        entities.fail_writes(true);

        let result = executor
            .execute(&Action::create_activity("x"), &mut data, tenant_id)
            .await;
        assert!(!result.success);
        assert!(!result.error.unwrap().is_empty());
    }
}
