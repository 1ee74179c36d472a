// Job worker - drains the execution queue and runs workflows

use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::jobs::{ExecutionJob, JobQueue};
use crate::storage::{EntityStore, WorkflowStore};
use crate::workflows::{TriggerData, WorkflowEngine};

pub struct JobWorker {
    queue: Arc<dyn JobQueue>,
    workflows: Arc<dyn WorkflowStore>,
    entities: Arc<dyn EntityStore>,
    engine: Arc<WorkflowEngine>,
    config: EngineConfig,
}

impl JobWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        workflows: Arc<dyn WorkflowStore>,
        entities: Arc<dyn EntityStore>,
        engine: Arc<WorkflowEngine>,
        config: EngineConfig,
    ) -> Self {
        Self {
            queue,
            workflows,
            entities,
            engine,
            config,
        }
    }

    /// Polls the queue forever. Intended to be spawned as a background task
    /// by the host.
    pub async fn run(&self) {
        info!(
            poll_interval = self.config.poll_interval_secs,
            batch_size = self.config.batch_size,
            "Workflow job worker started"
        );
        let mut ticker = interval(Duration::from_secs(self.config.poll_interval_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = self.drain().await {
                error!(error = %e, "Job batch failed");
            }
        }
    }

    /// Claims and processes one batch. Returns how many jobs were claimed.
    /// A job that cannot be processed never takes the rest of the batch
    /// down with it.
    pub async fn drain(&self) -> EngineResult<usize> {
        let jobs = self.queue.claim(self.config.batch_size).await?;
        let count = jobs.len();
        for job in jobs {
            let job_id = job.id;
            if let Err(e) = self.process(job).await {
                error!(%job_id, error = %e, "Failed to settle job");
            }
        }
        Ok(count)
    }

    /// Settles one claimed job: every path ends in exactly one of complete,
    /// retry or dead-letter. Infrastructure errors while loading the job's
    /// referents go through the same retry policy as execution errors, so a
    /// transient outage cannot strand a claimed job.
    async fn process(&self, job: ExecutionJob) -> EngineResult<()> {
        match self.run_job(&job).await {
            Ok(()) => self.queue.complete(job.id).await,
            Err(e) => {
                if job.attempts >= self.config.max_attempts {
                    error!(
                        job_id = %job.id,
                        attempts = job.attempts,
                        error = %e,
                        "Job exhausted retries, dead-lettering"
                    );
                    self.queue.dead_letter(job.id, &e.to_string()).await
                } else {
                    warn!(job_id = %job.id, attempts = job.attempts, error = %e, "Job failed, retrying");
                    self.queue
                        .retry(job.id, Duration::from_secs(self.config.retry_delay_secs))
                        .await
                }
            }
        }
    }

    async fn run_job(&self, job: &ExecutionJob) -> EngineResult<()> {
        // A deleted workflow or record between trigger and execution is
        // normal churn, not a fault. Drop the job without retrying.
        let Some(workflow) = self.workflows.find_by_id(job.workflow_id).await? else {
            warn!(job_id = %job.id, workflow_id = %job.workflow_id, "Workflow gone, dropping job");
            return Ok(());
        };
        let Some(entity) = self.entities.find(job.entity_kind, job.entity_id).await? else {
            warn!(
                job_id = %job.id,
                entity_id = %job.entity_id,
                "Triggering record gone, dropping job"
            );
            return Ok(());
        };

        let data = TriggerData::new(entity).with_context(job.context.clone());
        self.engine.execute(&workflow, &data).await?;
        Ok(())
    }
}
