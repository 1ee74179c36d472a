// In-memory storage for tests
//
// These keep everything behind a lock and support injecting write failures
// so engine error paths can be exercised without a database.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use uuid::Uuid;

use relay_shared::{Activity, Entity, EntityKind, User};

use crate::error::{EngineError, EngineResult};
use crate::notifications::{NotificationDispatcher, NotificationPayload};
use crate::storage::{EntityStore, RunStore, WorkflowStore};
use crate::workflows::{ActionResult, RunStatus, Workflow, WorkflowRun};

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<Vec<Workflow>>,
    fail_reads: AtomicBool,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, workflow: Workflow) {
        self.workflows.write().unwrap().push(workflow);
    }

    /// Makes every subsequent read fail, simulating a workflow store outage.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_readable(&self) -> EngineResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(EngineError::Storage(
                "workflow store unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn find_active(&self, tenant_id: Uuid, event: &str) -> EngineResult<Vec<Workflow>> {
        self.check_readable()?;
        let mut matched: Vec<Workflow> = self
            .workflows
            .read()
            .unwrap()
            .iter()
            .filter(|w| w.tenant_id == tenant_id && w.event == event && w.is_active)
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(matched)
    }

    async fn find_by_id(&self, id: Uuid) -> EngineResult<Option<Workflow>> {
        self.check_readable()?;
        Ok(self
            .workflows
            .read()
            .unwrap()
            .iter()
            .find(|w| w.id == id)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<Uuid, WorkflowRun>>,
    fail_finishes: AtomicBool,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `finish` fail, simulating a run store outage.
    pub fn fail_finishes(&self, fail: bool) {
        self.fail_finishes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create(&self, run: &WorkflowRun) -> EngineResult<()> {
        self.runs.write().unwrap().insert(run.id, run.clone());
        Ok(())
    }

    async fn finish(
        &self,
        run_id: Uuid,
        status: RunStatus,
        log: &[ActionResult],
        error_message: Option<&str>,
    ) -> EngineResult<()> {
        if self.fail_finishes.load(Ordering::SeqCst) {
            return Err(EngineError::Storage("run store unavailable".to_string()));
        }
        let mut runs = self.runs.write().unwrap();
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| EngineError::Storage(format!("run {run_id} not found")))?;
        run.status = status;
        run.completed_at = Some(Utc::now());
        run.execution_log = log.to_vec();
        run.error_message = error_message.map(str::to_string);
        Ok(())
    }

    async fn find_by_id(&self, run_id: Uuid) -> EngineResult<Option<WorkflowRun>> {
        Ok(self.runs.read().unwrap().get(&run_id).cloned())
    }

    async fn list_recent(&self, workflow_id: Uuid, limit: i64) -> EngineResult<Vec<WorkflowRun>> {
        let mut runs: Vec<WorkflowRun> = self
            .runs
            .read()
            .unwrap()
            .values()
            .filter(|r| r.workflow_id == workflow_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }
}

#[derive(Default)]
pub struct InMemoryEntityStore {
    entities: RwLock<HashMap<(EntityKind, Uuid), Entity>>,
    users: RwLock<HashMap<Uuid, User>>,
    activities: Mutex<Vec<Activity>>,
    fail_writes: AtomicBool,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, entity: Entity) {
        self.entities
            .write()
            .unwrap()
            .insert((entity.kind(), entity.id()), entity);
    }

    pub fn add_user(&self, user: User) {
        self.users.write().unwrap().insert(user.id, user);
    }

    /// Activities inserted by workflow actions, in insertion order.
    pub fn activities(&self) -> Vec<Activity> {
        self.activities.lock().unwrap().clone()
    }

    /// Makes every subsequent write fail, simulating a storage outage.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> EngineResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EngineError::Storage("entity store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn find(&self, kind: EntityKind, id: Uuid) -> EngineResult<Option<Entity>> {
        Ok(self.entities.read().unwrap().get(&(kind, id)).cloned())
    }

    async fn update(&self, entity: &Entity) -> EngineResult<()> {
        self.check_writable()?;
        self.entities
            .write()
            .unwrap()
            .insert((entity.kind(), entity.id()), entity.clone());
        Ok(())
    }

    async fn insert_activity(&self, activity: &Activity) -> EngineResult<()> {
        self.check_writable()?;
        self.activities.lock().unwrap().push(activity.clone());
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> EngineResult<Option<User>> {
        Ok(self.users.read().unwrap().get(&id).cloned())
    }
}

/// Captures dispatched notifications for assertions.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<(Uuid, NotificationPayload)>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(Uuid, NotificationPayload)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn notify(&self, user_id: Uuid, payload: NotificationPayload) {
        self.sent.lock().unwrap().push((user_id, payload));
    }
}
