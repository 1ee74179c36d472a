// Workflow Actions - declarative effects a workflow can perform

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use uuid::Uuid;

use super::triggers::TriggerData;

/// An action a workflow executes once its conditions pass.
///
/// Stored as JSON on the workflow definition; each variant carries its own
/// required parameters, so a definition missing one fails to save rather
/// than failing silently at run time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Creates a follow-up activity linked to the triggering record.
    /// Subject, description and due date support `{{field}}` templates.
    CreateActivity {
        subject: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        due_date: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assigned_to: Option<Uuid>,
    },
    /// Moves the triggering deal to a new status.
    UpdateDealStatus { status: String },
    /// Reassigns the triggering record to a user in the same tenant.
    AssignUser { user_id: Uuid },
    /// Notifies a user about the triggering record.
    SendNotification {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateActivity { .. } => "create_activity",
            Self::UpdateDealStatus { .. } => "update_deal_status",
            Self::AssignUser { .. } => "assign_user",
            Self::SendNotification { .. } => "send_notification",
        }
    }

    // ===== Builders =====

    pub fn create_activity(subject: &str) -> Self {
        Self::CreateActivity {
            subject: subject.to_string(),
            description: None,
            due_date: None,
            priority: None,
            assigned_to: None,
        }
    }

    pub fn update_deal_status(status: &str) -> Self {
        Self::UpdateDealStatus {
            status: status.to_string(),
        }
    }

    pub fn assign_user(user_id: Uuid) -> Self {
        Self::AssignUser { user_id }
    }

    pub fn send_notification(user_id: Option<Uuid>) -> Self {
        Self::SendNotification {
            user_id,
            status: None,
        }
    }
}

/// Outcome of one action, as recorded in the run's execution log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn success(action_type: &str, output: Value) -> Self {
        Self {
            success: true,
            action_type: Some(action_type.to_string()),
            output: Some(output),
            error: None,
        }
    }

    pub fn failure(action_type: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            action_type: Some(action_type.to_string()),
            output: None,
            error: Some(error.into()),
        }
    }

    /// A log-only entry, used when a run is skipped without executing actions.
    pub fn note(message: &str) -> Self {
        Self {
            success: true,
            action_type: None,
            output: Some(serde_json::json!({ "message": message })),
            error: None,
        }
    }
}

/// Replaces `{{field}}` tokens with the corresponding record field value.
///
/// Tokens naming a field the record lacks are left verbatim so a typo in a
/// template is visible in the produced text instead of vanishing.
pub fn resolve_template(template: &str, data: &TriggerData) -> String {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let token = TOKEN.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").unwrap());

    let mut result = template.to_string();
    for cap in token.captures_iter(template) {
        let Some(value) = data.entity_field(&cap[1]) else {
            continue;
        };
        let replacement = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => other.to_string(),
        };
        result = result.replace(&cap[0], &replacement);
    }
    result
}
