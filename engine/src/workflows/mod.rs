// Workflow automation: triggers fire events, conditions gate execution,
// actions do the work, the engine ties them together.

pub mod actions;
pub mod conditions;
pub mod engine;
pub mod executor;
pub mod triggers;

pub use actions::{resolve_template, Action, ActionResult};
pub use conditions::{Condition, DateComparison, FieldOperator, ThresholdOperator};
pub use engine::{
    trigger_type, ExecutionOutcome, RunStatus, Workflow, WorkflowEngine, WorkflowRun,
};
pub use executor::ActionExecutor;
pub use triggers::{TriggerData, TriggerEvent};
