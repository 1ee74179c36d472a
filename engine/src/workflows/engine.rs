// Workflow Engine - selects workflows for an event and runs a single workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use relay_shared::EntityKind;

use super::{conditions, Action, ActionExecutor, ActionResult, Condition, TriggerData, TriggerEvent};
use crate::error::EngineResult;
use crate::jobs::{ExecutionJob, JobQueue};
use crate::notifications::NotificationDispatcher;
use crate::storage::{EntityStore, RunStore, WorkflowStore};
use crate::tenant::TenantContext;

const SKIPPED_MESSAGE: &str = "Conditions not met, workflow skipped";

/// A tenant's automation rule: when `event` fires and `conditions` hold,
/// run `actions` in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub event: String,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub is_active: bool,
    /// Higher priority workflows are enqueued first. Ties go to the most
    /// recently created workflow.
    pub priority: i32,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Workflow {
    pub fn new(tenant_id: Uuid, name: &str, event: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.to_string(),
            description: None,
            event: event.to_string(),
            conditions: Vec::new(),
            actions: Vec::new(),
            is_active: true,
            priority: 0,
            created_by: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Audit record of one execution attempt. Written when the attempt starts
/// and finalized exactly once; immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workflow_id: Uuid,
    pub trigger_type: String,
    pub trigger_id: Uuid,
    pub status: RunStatus,
    pub executed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub execution_log: Vec<ActionResult>,
}

impl WorkflowRun {
    pub fn started(workflow: &Workflow, data: &TriggerData) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: workflow.tenant_id,
            workflow_id: workflow.id,
            trigger_type: trigger_type(data.entity.kind()).to_string(),
            trigger_id: data.entity.id(),
            status: RunStatus::Running,
            executed_at: Utc::now(),
            completed_at: None,
            error_message: None,
            execution_log: Vec::new(),
        }
    }
}

/// Which kind of record a run was triggered by, as recorded on the run.
/// Users never trigger workflows directly, so they map to "unknown".
pub fn trigger_type(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Lead => "lead",
        EntityKind::Deal => "deal",
        EntityKind::Activity => "activity",
        EntityKind::User => "unknown",
    }
}

/// What `execute` hands back to the execution job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub skipped: bool,
    pub workflow_id: Uuid,
    pub run_id: Uuid,
    pub execution_log: Vec<ActionResult>,
}

pub struct WorkflowEngine {
    workflows: Arc<dyn WorkflowStore>,
    runs: Arc<dyn RunStore>,
    queue: Arc<dyn JobQueue>,
    executor: ActionExecutor,
}

impl WorkflowEngine {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        runs: Arc<dyn RunStore>,
        entities: Arc<dyn EntityStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            workflows,
            runs,
            queue,
            executor: ActionExecutor::new(entities, notifier),
        }
    }

    /// Fans a domain event out to every subscribed workflow.
    ///
    /// Triggering is a side effect of whatever operation fired the event, so
    /// it must not block that operation: without a tenant context this is a
    /// logged no-op. One execution job is enqueued per matching workflow, in
    /// priority order; the jobs themselves run independently and no ordering
    /// holds between them at runtime.
    pub async fn trigger(
        &self,
        tenant: Option<&TenantContext>,
        event: TriggerEvent,
    ) -> EngineResult<Vec<Uuid>> {
        let Some(tenant) = tenant else {
            warn!(event = %event.event, "No tenant context, skipping workflow trigger");
            return Ok(Vec::new());
        };

        let workflows = self
            .workflows
            .find_active(tenant.tenant_id, &event.event)
            .await?;
        if workflows.is_empty() {
            return Ok(Vec::new());
        }

        let mut job_ids = Vec::with_capacity(workflows.len());
        for workflow in &workflows {
            let job = ExecutionJob::for_workflow(workflow.id, &event);
            job_ids.push(self.queue.enqueue(job).await?);
        }

        info!(
            event = %event.event,
            count = job_ids.len(),
            "Enqueued workflow executions"
        );
        Ok(job_ids)
    }

    /// Runs one workflow against one trigger, recording exactly one run.
    ///
    /// Action failures are captured in the execution log and never stop the
    /// remaining actions; the run finishes `failed` if any action failed.
    /// An `Err` from this function means the run record itself could not be
    /// finalized - the run is marked failed on a best-effort basis and the
    /// error propagates so the caller's retry policy can engage.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        data: &TriggerData,
    ) -> EngineResult<ExecutionOutcome> {
        let run = WorkflowRun::started(workflow, data);
        self.runs.create(&run).await?;

        let mut log: Vec<ActionResult> = Vec::new();
        match self.run_to_completion(workflow, data, run.id, &mut log).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(
                    workflow_id = %workflow.id,
                    run_id = %run.id,
                    error = %e,
                    "Workflow execution failed"
                );
                if let Err(update_err) = self
                    .runs
                    .finish(run.id, RunStatus::Failed, &log, Some(&e.to_string()))
                    .await
                {
                    error!(run_id = %run.id, error = %update_err, "Failed to record failed run");
                }
                Err(e)
            }
        }
    }

    async fn run_to_completion(
        &self,
        workflow: &Workflow,
        data: &TriggerData,
        run_id: Uuid,
        log: &mut Vec<ActionResult>,
    ) -> EngineResult<ExecutionOutcome> {
        if !conditions::evaluate(&workflow.conditions, data) {
            log.push(ActionResult::note(SKIPPED_MESSAGE));
            self.runs
                .finish(run_id, RunStatus::Completed, log, None)
                .await?;
            info!(workflow_id = %workflow.id, run_id = %run_id, "Workflow skipped");
            return Ok(ExecutionOutcome {
                success: false,
                skipped: true,
                workflow_id: workflow.id,
                run_id,
                execution_log: log.clone(),
            });
        }

        // Actions run against a working copy so a persisted mutation (a new
        // status, a new assignee) is visible to the actions after it.
        let mut data = data.clone();
        let mut has_errors = false;
        for action in &workflow.actions {
            let result = self
                .executor
                .execute(action, &mut data, workflow.tenant_id)
                .await;
            has_errors |= !result.success;
            log.push(result);
        }

        let status = if has_errors {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        self.runs.finish(run_id, status, log, None).await?;

        info!(
            workflow_id = %workflow.id,
            run_id = %run_id,
            actions = log.len(),
            success = !has_errors,
            "Workflow executed"
        );
        Ok(ExecutionOutcome {
            success: !has_errors,
            skipped: false,
            workflow_id: workflow.id,
            run_id,
            execution_log: log.clone(),
        })
    }
}
