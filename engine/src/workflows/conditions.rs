// Workflow Conditions - declarative gates evaluated before actions run

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::triggers::TriggerData;

const DEFAULT_DATE_FIELD: &str = "due_date";

/// A single condition on the trigger that fired.
///
/// Workflow definitions store these as JSON; deserialization rejects unknown
/// condition types and operators outright, so a saved workflow can only
/// contain shapes the evaluator understands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Matches a status transition carried in the event context.
    /// An unset side means "don't care".
    StatusChange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_status: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_status: Option<String>,
    },
    /// Compares a date field of the record against a target date.
    DateReached {
        /// Record field holding the date; defaults to "due_date".
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date_field: Option<String>,
        comparison: DateComparison,
        /// Defaults to the evaluation time when unset.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_date: Option<String>,
    },
    /// Numeric comparison of a record field against a threshold.
    ValueThreshold {
        field: String,
        operator: ThresholdOperator,
        threshold: f64,
    },
    /// Equality-style comparison of a record field against a value.
    FieldEquals {
        field: String,
        operator: FieldOperator,
        value: Value,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DateComparison {
    /// Same calendar day as the target date
    Equals,
    Before,
    After,
    /// Record date lies in the past relative to evaluation time
    Overdue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOperator {
    Gte,
    Lte,
    Equals,
    Gt,
    Lt,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldOperator {
    Equals,
    NotEquals,
    Contains,
    In,
    NotIn,
}

/// Evaluates a workflow's conditions against the trigger.
///
/// Pure: reads only from the supplied trigger data (plus the clock for date
/// conditions). An empty list passes; otherwise every condition must pass,
/// short-circuiting on the first failure.
pub fn evaluate(conditions: &[Condition], data: &TriggerData) -> bool {
    evaluate_at(conditions, data, Utc::now())
}

pub(crate) fn evaluate_at(
    conditions: &[Condition],
    data: &TriggerData,
    now: DateTime<Utc>,
) -> bool {
    conditions.iter().all(|c| evaluate_condition(c, data, now))
}

fn evaluate_condition(condition: &Condition, data: &TriggerData, now: DateTime<Utc>) -> bool {
    match condition {
        Condition::StatusChange {
            from_status,
            to_status,
        } => {
            let old = data.context_str("old_status");
            let new = data
                .context_str("new_status")
                .or_else(|| data.context_str("status"));

            let from_matches = match from_status {
                Some(expected) => old == Some(expected.as_str()),
                None => true,
            };
            let to_matches = match to_status {
                Some(expected) => new == Some(expected.as_str()),
                None => true,
            };
            from_matches && to_matches
        }
        Condition::DateReached {
            date_field,
            comparison,
            target_date,
        } => {
            let field = date_field.as_deref().unwrap_or(DEFAULT_DATE_FIELD);
            let Some(entity_date) = data.entity_field(field).as_ref().and_then(parse_date) else {
                return false;
            };
            let target = target_date
                .as_deref()
                .and_then(parse_date_str)
                .unwrap_or(now);

            match comparison {
                DateComparison::Equals => entity_date.date_naive() == target.date_naive(),
                DateComparison::Before => entity_date < target,
                DateComparison::After => entity_date > target,
                DateComparison::Overdue => entity_date < now,
            }
        }
        Condition::ValueThreshold {
            field,
            operator,
            threshold,
        } => {
            let Some(value) = data.entity_field(field).as_ref().and_then(numeric) else {
                return false;
            };
            match operator {
                ThresholdOperator::Gte => value >= *threshold,
                ThresholdOperator::Lte => value <= *threshold,
                ThresholdOperator::Equals => value == *threshold,
                ThresholdOperator::Gt => value > *threshold,
                ThresholdOperator::Lt => value < *threshold,
            }
        }
        Condition::FieldEquals {
            field,
            operator,
            value,
        } => {
            let Some(field_value) = data.entity_field(field) else {
                return false;
            };
            match operator {
                FieldOperator::Equals => json_eq(&field_value, value),
                FieldOperator::NotEquals => !json_eq(&field_value, value),
                FieldOperator::Contains => {
                    match (field_value.as_str(), value.as_str()) {
                        (Some(s), Some(pattern)) => s.contains(pattern),
                        _ => false,
                    }
                }
                FieldOperator::In => in_list(&field_value, value),
                FieldOperator::NotIn => !in_list(&field_value, value),
            }
        }
    }
}

/// Equality with numeric coercion, so 1500 matches "1500.00" stored as text.
fn json_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Membership test, coercing a scalar condition value into a one-element list.
fn in_list(field_value: &Value, condition_value: &Value) -> bool {
    match condition_value {
        Value::Array(items) => items.iter().any(|item| json_eq(field_value, item)),
        scalar => json_eq(field_value, scalar),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    value.as_str().and_then(parse_date_str)
}

pub(crate) fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}
