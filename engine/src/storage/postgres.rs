// Postgres storage
//
// Workflow definitions and runs serialize their condition/action payloads as
// jsonb. Rows whose payloads no longer deserialize (a definition written by
// an older version, say) are skipped with a warning instead of poisoning the
// whole query.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use relay_shared::{Activity, Deal, Entity, EntityKind, Lead, User};

use crate::error::{EngineError, EngineResult};
use crate::storage::{EntityStore, RunStore, WorkflowStore};
use crate::workflows::{Action, ActionResult, Condition, RunStatus, Workflow, WorkflowRun};

type WorkflowRow = (
    Uuid,
    Uuid,
    String,
    Option<String>,
    String,
    Value,
    Value,
    bool,
    i32,
    Option<Uuid>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

const WORKFLOW_COLUMNS: &str =
    "id, tenant_id, name, description, event, conditions, actions, is_active, priority, created_by, created_at, updated_at";

fn workflow_from_row(row: WorkflowRow) -> Option<Workflow> {
    let (
        id,
        tenant_id,
        name,
        description,
        event,
        conditions,
        actions,
        is_active,
        priority,
        created_by,
        created_at,
        updated_at,
    ) = row;
    let conditions: Vec<Condition> = match serde_json::from_value(conditions) {
        Ok(c) => c,
        Err(e) => {
            warn!(workflow_id = %id, error = %e, "Skipping workflow with unreadable conditions");
            return None;
        }
    };
    let actions: Vec<Action> = match serde_json::from_value(actions) {
        Ok(a) => a,
        Err(e) => {
            warn!(workflow_id = %id, error = %e, "Skipping workflow with unreadable actions");
            return None;
        }
    };
    Some(Workflow {
        id,
        tenant_id,
        name,
        description,
        event,
        conditions,
        actions,
        is_active,
        priority,
        created_by,
        created_at,
        updated_at,
    })
}

pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn find_active(&self, tenant_id: Uuid, event: &str) -> EngineResult<Vec<Workflow>> {
        let rows: Vec<WorkflowRow> = sqlx::query_as(&format!(
            r#"
            SELECT {WORKFLOW_COLUMNS}
            FROM workflows
            WHERE tenant_id = $1 AND event = $2 AND is_active = true AND deleted_at IS NULL
            ORDER BY priority DESC, created_at DESC
            "#
        ))
        .bind(tenant_id)
        .bind(event)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(workflow_from_row).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> EngineResult<Option<Workflow>> {
        let row: Option<WorkflowRow> = sqlx::query_as(&format!(
            r#"
            SELECT {WORKFLOW_COLUMNS}
            FROM workflows
            WHERE id = $1 AND deleted_at IS NULL
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(workflow_from_row))
    }
}

type RunRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    Uuid,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<String>,
    Value,
);

const RUN_COLUMNS: &str =
    "id, tenant_id, workflow_id, trigger_type, trigger_id, status, executed_at, completed_at, error_message, execution_log";

fn run_from_row(row: RunRow) -> EngineResult<WorkflowRun> {
    let (
        id,
        tenant_id,
        workflow_id,
        trigger_type,
        trigger_id,
        status,
        executed_at,
        completed_at,
        error_message,
        execution_log,
    ) = row;
    let status = RunStatus::parse(&status)
        .ok_or_else(|| EngineError::Storage(format!("run {id} has unknown status '{status}'")))?;
    let execution_log: Vec<ActionResult> = serde_json::from_value(execution_log)?;
    Ok(WorkflowRun {
        id,
        tenant_id,
        workflow_id,
        trigger_type,
        trigger_id,
        status,
        executed_at,
        completed_at,
        error_message,
        execution_log,
    })
}

pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn create(&self, run: &WorkflowRun) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_runs (id, tenant_id, workflow_id, trigger_type, trigger_id, status, executed_at, execution_log)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(run.id)
        .bind(run.tenant_id)
        .bind(run.workflow_id)
        .bind(&run.trigger_type)
        .bind(run.trigger_id)
        .bind(run.status.as_str())
        .bind(run.executed_at)
        .bind(serde_json::to_value(&run.execution_log)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finish(
        &self,
        run_id: Uuid,
        status: RunStatus,
        log: &[ActionResult],
        error_message: Option<&str>,
    ) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE workflow_runs
            SET status = $2, completed_at = NOW(), execution_log = $3, error_message = $4
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(serde_json::to_value(log)?)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, run_id: Uuid) -> EngineResult<Option<WorkflowRun>> {
        let row: Option<RunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM workflow_runs WHERE id = $1"
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(run_from_row).transpose()
    }

    async fn list_recent(&self, workflow_id: Uuid, limit: i64) -> EngineResult<Vec<WorkflowRun>> {
        let rows: Vec<RunRow> = sqlx::query_as(&format!(
            r#"
            SELECT {RUN_COLUMNS}
            FROM workflow_runs
            WHERE workflow_id = $1
            ORDER BY executed_at DESC
            LIMIT $2
            "#
        ))
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(run_from_row).collect()
    }
}

pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn find(&self, kind: EntityKind, id: Uuid) -> EngineResult<Option<Entity>> {
        let entity = match kind {
            EntityKind::Lead => {
                sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(Entity::Lead)
            }
            EntityKind::Deal => {
                sqlx::query_as::<_, Deal>("SELECT * FROM deals WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(Entity::Deal)
            }
            EntityKind::Activity => {
                sqlx::query_as::<_, Activity>("SELECT * FROM activities WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(Entity::Activity)
            }
            EntityKind::User => self.find_user(id).await?.map(Entity::User),
        };
        Ok(entity)
    }

    async fn update(&self, entity: &Entity) -> EngineResult<()> {
        // Workflow actions only ever change status and assignee.
        match entity {
            Entity::Lead(lead) => {
                sqlx::query(
                    "UPDATE leads SET status = $2, assigned_to = $3, updated_at = NOW() WHERE id = $1",
                )
                .bind(lead.id)
                .bind(&lead.status)
                .bind(lead.assigned_to)
                .execute(&self.pool)
                .await?;
            }
            Entity::Deal(deal) => {
                sqlx::query(
                    "UPDATE deals SET status = $2, assigned_to = $3, updated_at = NOW() WHERE id = $1",
                )
                .bind(deal.id)
                .bind(&deal.status)
                .bind(deal.assigned_to)
                .execute(&self.pool)
                .await?;
            }
            Entity::Activity(activity) => {
                sqlx::query(
                    "UPDATE activities SET status = $2, assigned_to = $3, updated_at = NOW() WHERE id = $1",
                )
                .bind(activity.id)
                .bind(&activity.status)
                .bind(activity.assigned_to)
                .execute(&self.pool)
                .await?;
            }
            Entity::User(_) => {
                return Err(EngineError::Storage(
                    "workflow actions cannot modify users".to_string(),
                ));
            }
        }
        Ok(())
    }

    async fn insert_activity(&self, activity: &Activity) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO activities (id, tenant_id, subject, description, activity_type, status, priority, due_date, related_type, related_id, assigned_to, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(activity.id)
        .bind(activity.tenant_id)
        .bind(&activity.subject)
        .bind(&activity.description)
        .bind(&activity.activity_type)
        .bind(&activity.status)
        .bind(&activity.priority)
        .bind(activity.due_date)
        .bind(&activity.related_type)
        .bind(activity.related_id)
        .bind(activity.assigned_to)
        .bind(activity.created_by)
        .bind(activity.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> EngineResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, tenant_id, name, email, is_active, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
