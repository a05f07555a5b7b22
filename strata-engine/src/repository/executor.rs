//! Pipeline executor repository
//!
//! The external service that creates and runs pipelines:
//! - Submitting a resolved plan
//! - Polling a submission until it reaches a terminal state
//! - Deleting pipelines that left the deployment map

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strata_core::domain::plan::PipelinePlan;

use super::CapabilityResult;

/// State of a submitted pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    InProgress,
    Succeeded,
    Failed(String),
}

/// Repository trait for the pipeline executor
#[async_trait]
pub trait PipelineExecutorRepository: Send + Sync {
    /// Submits a plan and returns the submission id
    async fn submit(&self, plan: &PipelinePlan) -> CapabilityResult<String>;

    /// Returns the current status of a submission
    async fn status(&self, submission_id: &str) -> CapabilityResult<SubmissionStatus>;

    /// Deletes a pipeline by name
    async fn delete(&self, pipeline: &str) -> CapabilityResult<()>;
}
