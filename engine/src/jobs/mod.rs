// Asynchronous execution: triggering enqueues jobs, workers drain them.

pub mod queue;
pub mod worker;

pub use queue::{ExecutionJob, InMemoryJobQueue, JobQueue, PgJobQueue};
pub use worker::JobWorker;
