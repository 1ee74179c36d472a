// Workflow Triggers - CRM domain events that can start workflow execution

use relay_shared::{Activity, Deal, Entity, Lead};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A domain event fired by the CRM as a side effect of a normal operation.
///
/// The event key is what workflows subscribe to ("deal.status_changed");
/// the context map carries event-specific details beyond the record itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event: String,
    pub entity: Entity,
    pub context: Map<String, Value>,
}

impl TriggerEvent {
    pub fn new(event: &str, entity: Entity) -> Self {
        Self {
            event: event.to_string(),
            entity,
            context: Map::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    pub fn deal_created(deal: Deal) -> Self {
        let status = deal.status.clone();
        Self::new("deal.created", Entity::Deal(deal)).with_context("status", status.into())
    }

    pub fn deal_status_changed(deal: Deal, old_status: &str, new_status: &str) -> Self {
        Self::new("deal.status_changed", Entity::Deal(deal))
            .with_context("old_status", old_status.into())
            .with_context("new_status", new_status.into())
    }

    pub fn lead_created(lead: Lead) -> Self {
        let status = lead.status.clone();
        Self::new("lead.created", Entity::Lead(lead)).with_context("status", status.into())
    }

    pub fn lead_status_changed(lead: Lead, old_status: &str, new_status: &str) -> Self {
        Self::new("lead.status_changed", Entity::Lead(lead))
            .with_context("old_status", old_status.into())
            .with_context("new_status", new_status.into())
    }

    pub fn activity_due(activity: Activity) -> Self {
        Self::new("activity.due", Entity::Activity(activity))
    }
}

/// Everything condition evaluation and action execution read from.
///
/// Transient: built fresh per execution from the reloaded record plus the
/// context captured when the event fired. Never persisted.
#[derive(Debug, Clone)]
pub struct TriggerData {
    pub entity: Entity,
    pub context: Map<String, Value>,
}

impl TriggerData {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            context: Map::new(),
        }
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Reads a string value out of the event context.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }

    /// Reads a field of the underlying record.
    pub fn entity_field(&self, name: &str) -> Option<Value> {
        self.entity.field(name)
    }
}

impl From<TriggerEvent> for TriggerData {
    fn from(event: TriggerEvent) -> Self {
        Self {
            entity: event.entity,
            context: event.context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn deal(status: &str) -> Deal {
        Deal {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            title: "Renewal".to_string(),
            status: status.to_string(),
            amount: Decimal::new(50000, 2),
            currency: "USD".to_string(),
            expected_close_date: None,
            lead_id: None,
            assigned_to: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_status_change_event_context() {
        let event = TriggerEvent::deal_status_changed(deal("won"), "open", "won");
        assert_eq!(event.event, "deal.status_changed");

        let data = TriggerData::from(event);
        assert_eq!(data.context_str("old_status"), Some("open"));
        assert_eq!(data.context_str("new_status"), Some("won"));
    }

    #[test]
    fn test_entity_field_through_trigger_data() {
        let data = TriggerData::from(TriggerEvent::deal_created(deal("open")));
        assert_eq!(
            data.entity_field("title"),
            Some(Value::String("Renewal".to_string()))
        );
    }
}
