//! Scheduler error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use jobgrid_bridge::BridgeError;
use jobgrid_core::{JobStatus, ValidationError};

/// Errors returned to callers of [`JobLifecycleManager`](crate::JobLifecycleManager).
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("job already exists: {0}")]
    Duplicate(String),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job {job_id} is {status}; operation needs {expected}")]
    InvalidState {
        job_id: String,
        status: JobStatus,
        expected: JobStatus,
    },

    #[error("no external scheduler configured")]
    NoScheduler,

    #[error("scheduler error: {0}")]
    Scheduler(#[from] BridgeError),
}

pub type JobResult<T> = Result<T, JobError>;

/// Why an execution task failed. Its text ends up in `JobRecord.error`.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("executable not found: {0}")]
    ExecutableNotFound(PathBuf),

    #[error("project file not found: {0}")]
    ProjectNotFound(PathBuf),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job timed out after {0:?}")]
    Timeout(Duration),

    #[error("scheduler submission failed: {0}")]
    Submission(String),

    #[error("no job id in scheduler submission output: {0:?}")]
    SubmissionIdMissing(String),

    #[error("execution task panicked")]
    Panicked,
}
