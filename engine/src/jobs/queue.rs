// Execution job queue
//
// Jobs carry a reference to the triggering record, not a snapshot of it;
// the worker reloads the record at execution time so actions see current
// state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use relay_shared::EntityKind;

use crate::error::{EngineError, EngineResult};
use crate::workflows::TriggerEvent;

/// One pending workflow execution: which workflow to run, against which
/// record, with the event context captured at trigger time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionJob {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub event: String,
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub context: Map<String, Value>,
    /// How many times this job has been claimed, including the current claim.
    pub attempts: i32,
}

impl ExecutionJob {
    pub fn for_workflow(workflow_id: Uuid, event: &TriggerEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            event: event.event.clone(),
            entity_kind: event.entity.kind(),
            entity_id: event.entity.id(),
            context: event.context.clone(),
            attempts: 0,
        }
    }
}

/// Queue operations the engine and worker need. Claimed jobs must end in
/// exactly one of `complete`, `retry` or `dead_letter`.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: ExecutionJob) -> EngineResult<Uuid>;

    /// Claims up to `limit` jobs for execution, oldest first. A claimed
    /// job is invisible to other workers and comes back with its attempt
    /// counter already incremented.
    async fn claim(&self, limit: i64) -> EngineResult<Vec<ExecutionJob>>;

    async fn complete(&self, job_id: Uuid) -> EngineResult<()>;

    /// Returns a claimed job to the queue, visible again after `delay`.
    async fn retry(&self, job_id: Uuid, delay: Duration) -> EngineResult<()>;

    /// Parks a job that has exhausted its attempts, keeping the final error
    /// for inspection.
    async fn dead_letter(&self, job_id: Uuid, error: &str) -> EngineResult<()>;
}

// ===== Postgres queue =====

/// Queue backed by a `workflow_jobs` table. Claiming uses
/// `FOR UPDATE SKIP LOCKED` so multiple workers can drain the same table
/// without handing out a job twice.
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: ExecutionJob) -> EngineResult<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO workflow_jobs (id, workflow_id, event, entity_kind, entity_id, context, attempts, status, run_after, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, 'queued', NOW(), NOW())
            "#,
        )
        .bind(job.id)
        .bind(job.workflow_id)
        .bind(&job.event)
        .bind(job.entity_kind.as_str())
        .bind(job.entity_id)
        .bind(Value::Object(job.context.clone()))
        .execute(&self.pool)
        .await?;
        Ok(job.id)
    }

    async fn claim(&self, limit: i64) -> EngineResult<Vec<ExecutionJob>> {
        let rows: Vec<(Uuid, Uuid, String, String, Uuid, Value, i32)> = sqlx::query_as(
            r#"
            UPDATE workflow_jobs
            SET status = 'running', attempts = attempts + 1, updated_at = NOW()
            WHERE id IN (
                SELECT id FROM workflow_jobs
                WHERE status = 'queued' AND run_after <= NOW()
                ORDER BY created_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, workflow_id, event, entity_kind, entity_id, context, attempts
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let jobs = rows
            .into_iter()
            .filter_map(|(id, workflow_id, event, kind, entity_id, context, attempts)| {
                let Some(entity_kind) = EntityKind::parse(&kind) else {
                    warn!(job_id = %id, kind = %kind, "Skipping job with unknown entity kind");
                    return None;
                };
                let context = match context {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                Some(ExecutionJob {
                    id,
                    workflow_id,
                    event,
                    entity_kind,
                    entity_id,
                    context,
                    attempts,
                })
            })
            .collect();
        Ok(jobs)
    }

    async fn complete(&self, job_id: Uuid) -> EngineResult<()> {
        sqlx::query("DELETE FROM workflow_jobs WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn retry(&self, job_id: Uuid, delay: Duration) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE workflow_jobs
            SET status = 'queued', run_after = NOW() + make_interval(secs => $2), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn dead_letter(&self, job_id: Uuid, error: &str) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE workflow_jobs
            SET status = 'dead', last_error = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ===== In-memory queue =====

#[derive(Default)]
struct QueueState {
    queued: VecDeque<ExecutionJob>,
    running: HashMap<Uuid, ExecutionJob>,
    completed: Vec<Uuid>,
    dead: Vec<(ExecutionJob, String)>,
}

/// Test queue. Retried jobs become claimable immediately; the retry delay
/// is a scheduling concern the Postgres queue owns.
#[derive(Default)]
pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queued_len(&self) -> usize {
        self.state.lock().unwrap().queued.len()
    }

    pub fn completed(&self) -> Vec<Uuid> {
        self.state.lock().unwrap().completed.clone()
    }

    pub fn dead_letters(&self) -> Vec<(ExecutionJob, String)> {
        self.state.lock().unwrap().dead.clone()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: ExecutionJob) -> EngineResult<Uuid> {
        let id = job.id;
        self.state.lock().unwrap().queued.push_back(job);
        Ok(id)
    }

    async fn claim(&self, limit: i64) -> EngineResult<Vec<ExecutionJob>> {
        let mut state = self.state.lock().unwrap();
        let mut claimed = Vec::new();
        while claimed.len() < limit as usize {
            let Some(mut job) = state.queued.pop_front() else {
                break;
            };
            job.attempts += 1;
            state.running.insert(job.id, job.clone());
            claimed.push(job);
        }
        Ok(claimed)
    }

    async fn complete(&self, job_id: Uuid) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .running
            .remove(&job_id)
            .ok_or_else(|| EngineError::Queue(format!("job {job_id} is not running")))?;
        state.completed.push(job_id);
        Ok(())
    }

    async fn retry(&self, job_id: Uuid, _delay: Duration) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let job = state
            .running
            .remove(&job_id)
            .ok_or_else(|| EngineError::Queue(format!("job {job_id} is not running")))?;
        state.queued.push_back(job);
        Ok(())
    }

    async fn dead_letter(&self, job_id: Uuid, error: &str) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let job = state
            .running
            .remove(&job_id)
            .ok_or_else(|| EngineError::Queue(format!("job {job_id} is not running")))?;
        state.dead.push((job, error.to_string()));
        Ok(())
    }
}
