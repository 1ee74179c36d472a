// Storage ports the engine depends on
//
// The engine never talks to the database directly; it goes through these
// traits so executions can be tested against in-memory implementations and
// hosted against the Postgres ones.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use relay_shared::{Activity, Entity, EntityKind, User};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::workflows::{ActionResult, RunStatus, Workflow, WorkflowRun};

pub use memory::{InMemoryEntityStore, InMemoryRunStore, InMemoryWorkflowStore, RecordingDispatcher};
pub use postgres::{PgEntityStore, PgRunStore, PgWorkflowStore};

/// Read access to workflow definitions. Definitions are managed elsewhere
/// (management UI); the engine only ever reads them.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Active workflows subscribed to an event, ordered by priority
    /// descending with newest-first as the tie-break.
    async fn find_active(&self, tenant_id: Uuid, event: &str) -> EngineResult<Vec<Workflow>>;

    async fn find_by_id(&self, id: Uuid) -> EngineResult<Option<Workflow>>;
}

/// Append-only run history. Each run is written exactly twice: once when it
/// starts and once when it reaches a terminal status.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create(&self, run: &WorkflowRun) -> EngineResult<()>;

    async fn finish(
        &self,
        run_id: Uuid,
        status: RunStatus,
        log: &[ActionResult],
        error_message: Option<&str>,
    ) -> EngineResult<()>;

    async fn find_by_id(&self, run_id: Uuid) -> EngineResult<Option<WorkflowRun>>;

    async fn list_recent(&self, workflow_id: Uuid, limit: i64) -> EngineResult<Vec<WorkflowRun>>;
}

/// Access to the CRM records workflows read and mutate.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find(&self, kind: EntityKind, id: Uuid) -> EngineResult<Option<Entity>>;

    /// Persists mutations an action made to a record.
    async fn update(&self, entity: &Entity) -> EngineResult<()>;

    async fn insert_activity(&self, activity: &Activity) -> EngineResult<()>;

    async fn find_user(&self, id: Uuid) -> EngineResult<Option<User>>;
}
