//! In-process execution engine that records jobs instead of running them.

use async_trait::async_trait;
use kiln_core::JobDescription;
use kiln_core::ports::{ExecutionEngine, Submission};
use tokio::sync::Mutex;
use tracing::debug;

/// Keeps every submitted job in memory, in submission order.
#[derive(Debug, Default)]
pub struct DryRunEngine {
    jobs: Mutex<Vec<JobDescription>>,
}

impl DryRunEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs submitted so far.
    pub async fn jobs(&self) -> Vec<JobDescription> {
        self.jobs.lock().await.clone()
    }
}

#[async_trait]
impl ExecutionEngine for DryRunEngine {
    async fn submit(&self, job: JobDescription) -> kiln_core::Result<Submission> {
        let mut jobs = self.jobs.lock().await;
        let job_ref = format!("dry-run-{}-{}", jobs.len() + 1, job.builder);
        debug!(job_ref = %job_ref, steps = job.steps.len(), "Recorded job");
        jobs.push(job);
        Ok(Submission { job_ref })
    }
}
