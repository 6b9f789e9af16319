//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the core domain and external adapters.

use crate::Result;
use crate::assembler::JobDescription;
use crate::resource::{CatalogSnapshot, Resource};
use async_trait::async_trait;

/// Source of available workers and images.
///
/// Called synchronously on every matching request; implementations return a
/// fresh point-in-time list and keep no subscription open.
pub trait CatalogProvider: Send + Sync {
    /// Current workers, in catalog order.
    fn workers(&self) -> Result<Vec<Resource>>;

    /// Current images, in catalog order.
    fn images(&self) -> Result<Vec<Resource>>;

    /// Both pools as one snapshot.
    fn snapshot(&self) -> Result<CatalogSnapshot> {
        Ok(CatalogSnapshot::new(self.workers()?, self.images()?))
    }
}

/// Receipt returned by an execution engine for an accepted job.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Submission {
    pub job_ref: String,
}

/// Runs assembled jobs.
///
/// Step failure policy (abort on first failure or continue) belongs to the
/// engine; jobs arrive with their steps in execution order.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Accept a job for execution.
    async fn submit(&self, job: JobDescription) -> Result<Submission>;
}
