// CRM workflow automation engine
//
// Domain events fire triggers, triggers enqueue execution jobs, workers run
// workflows (conditions then actions) and record every attempt as a run.

pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod notifications;
pub mod storage;
pub mod tenant;
pub mod workflows;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use jobs::{ExecutionJob, JobQueue, JobWorker};
pub use notifications::{NotificationDispatcher, NotificationPayload};
pub use tenant::TenantContext;
pub use workflows::{
    Action, ActionResult, Condition, ExecutionOutcome, TriggerData, TriggerEvent, Workflow,
    WorkflowEngine, WorkflowRun,
};
