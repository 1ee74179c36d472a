use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: String, // new, contacted, qualified, lost, converted
    pub source: Option<String>,
    pub estimated_value: Option<Decimal>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub status: String, // open, negotiation, won, lost
    pub amount: Decimal,
    pub currency: String,
    pub expected_close_date: Option<DateTime<Utc>>,
    pub lead_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subject: String,
    pub description: Option<String>,
    pub activity_type: String, // task, call, meeting, email
    pub status: String,        // pending, in_progress, completed, cancelled
    pub priority: String,      // low, medium, high
    pub due_date: Option<DateTime<Utc>>,
    pub related_type: Option<String>, // lead, deal
    pub related_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub notification_type: String, // info, warning, error, success
    pub entity_type: Option<String>, // lead, deal, activity
    pub entity_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// The kinds of CRM records workflows can operate on.
///
/// A closed set: workflow payloads name one of these kinds instead of carrying
/// free-form class names, so a job can always reload the record it refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Lead,
    Deal,
    Activity,
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Deal => "deal",
            Self::Activity => "activity",
            Self::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lead" => Some(Self::Lead),
            "deal" => Some(Self::Deal),
            "activity" => Some(Self::Activity),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A CRM record as seen by the workflow engine.
///
/// Tagged union over the concrete record types. Capability checks (can this
/// record be assigned? does it carry a status?) are answered by the methods
/// below rather than by probing fields at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Lead(Lead),
    Deal(Deal),
    Activity(Activity),
    User(User),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Lead(_) => EntityKind::Lead,
            Self::Deal(_) => EntityKind::Deal,
            Self::Activity(_) => EntityKind::Activity,
            Self::User(_) => EntityKind::User,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Lead(l) => l.id,
            Self::Deal(d) => d.id,
            Self::Activity(a) => a.id,
            Self::User(u) => u.id,
        }
    }

    pub fn tenant_id(&self) -> Uuid {
        match self {
            Self::Lead(l) => l.tenant_id,
            Self::Deal(d) => d.tenant_id,
            Self::Activity(a) => a.tenant_id,
            Self::User(u) => u.tenant_id,
        }
    }

    /// Current assignee, for kinds that support assignment. Users do not.
    pub fn assigned_to(&self) -> Option<Uuid> {
        match self {
            Self::Lead(l) => l.assigned_to,
            Self::Deal(d) => d.assigned_to,
            Self::Activity(a) => a.assigned_to,
            Self::User(_) => None,
        }
    }

    /// Reassigns the record. Returns false when the kind has no assignee
    /// concept, leaving the record untouched.
    pub fn set_assigned_to(&mut self, user_id: Uuid) -> bool {
        match self {
            Self::Lead(l) => {
                l.assigned_to = Some(user_id);
                true
            }
            Self::Deal(d) => {
                d.assigned_to = Some(user_id);
                true
            }
            Self::Activity(a) => {
                a.assigned_to = Some(user_id);
                true
            }
            Self::User(_) => false,
        }
    }

    pub fn created_by(&self) -> Option<Uuid> {
        match self {
            Self::Lead(l) => l.created_by,
            Self::Deal(d) => d.created_by,
            Self::Activity(a) => a.created_by,
            Self::User(_) => None,
        }
    }

    pub fn status(&self) -> Option<&str> {
        match self {
            Self::Lead(l) => Some(&l.status),
            Self::Deal(d) => Some(&d.status),
            Self::Activity(a) => Some(&a.status),
            Self::User(_) => None,
        }
    }

    pub fn set_status(&mut self, status: &str) -> bool {
        match self {
            Self::Lead(l) => {
                l.status = status.to_string();
                true
            }
            Self::Deal(d) => {
                d.status = status.to_string();
                true
            }
            Self::Activity(a) => {
                a.status = status.to_string();
                true
            }
            Self::User(_) => false,
        }
    }

    /// Looks up a record field by name for declarative conditions and
    /// template substitution. Returns None for fields the record lacks.
    pub fn field(&self, name: &str) -> Option<Value> {
        let object = match self {
            Self::Lead(l) => serde_json::to_value(l),
            Self::Deal(d) => serde_json::to_value(d),
            Self::Activity(a) => serde_json::to_value(a),
            Self::User(u) => serde_json::to_value(u),
        };
        object.ok()?.get(name).filter(|v| !v.is_null()).cloned()
    }
}
