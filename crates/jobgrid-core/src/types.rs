//! Domain types for jobgrid.
//!
//! `JobRecord` is the in-memory registry entry for one submitted job;
//! `JobSummary` is its serializable public view. Status changes go
//! through `JobRecord::transition` so the state machine is enforced in
//! one place.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{TransitionError, ValidationError};
use crate::simulation::SimulationConfig;

/// Caller-supplied, process-unique job identifier.
pub type JobId = String;

// ── Job status ────────────────────────────────────────────────────

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Scheduled,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Scheduled,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// COMPLETED, FAILED and CANCELLED admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the state machine permits `self -> next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match self {
            Queued => matches!(next, Running | Scheduled | Cancelled | Failed),
            Running => matches!(next, Completed | Failed | Cancelled),
            Scheduled => matches!(next, Running | Completed | Failed | Cancelled),
            Completed | Failed | Cancelled => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Scheduled => "scheduled",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Scheduler type ────────────────────────────────────────────────

/// Where a job executes: a local subprocess or an external batch scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerType {
    #[default]
    None,
    Slurm,
    Lsf,
}

impl SchedulerType {
    pub fn is_external(self) -> bool {
        !matches!(self, SchedulerType::None)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerType::None => "none",
            SchedulerType::Slurm => "slurm",
            SchedulerType::Lsf => "lsf",
        }
    }
}

impl fmt::Display for SchedulerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulerType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "local" => Ok(SchedulerType::None),
            "slurm" => Ok(SchedulerType::Slurm),
            "lsf" => Ok(SchedulerType::Lsf),
            other => Err(ValidationError::new(
                "scheduler_type",
                format!("unknown scheduler type {other:?}"),
            )),
        }
    }
}

// ── Resource snapshot ─────────────────────────────────────────────

/// One telemetry reading of the host. Replaced wholesale on every tick.
///
/// The default value is all zeros, which is what admission sees until the
/// first sample lands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_used_gb: f64,
    pub memory_total_gb: f64,
    pub memory_free_gb: f64,
    pub disk_usage_percent: f64,
    pub disk_free_gb: f64,
    /// Unix timestamp (seconds) of the sample; 0 until the first sample.
    pub timestamp: u64,
}

// ── Job record ────────────────────────────────────────────────────

/// Registry entry for one submitted job.
///
/// `status` and `external_job_id` are private: the first only moves
/// along the state machine, the second is set exactly when the job
/// becomes SCHEDULED.
#[derive(Debug)]
pub struct JobRecord {
    pub id: JobId,
    pub config: Arc<dyn SimulationConfig>,
    status: JobStatus,
    pub priority: i32,
    pub submitted_at: u64,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub return_code: Option<i32>,
    pub stdout_capture: String,
    pub stderr_capture: String,
    external_job_id: Option<String>,
    /// Telemetry copied when execution began.
    pub resource_snapshot: Option<ResourceSnapshot>,
    pub error: Option<String>,
}

impl JobRecord {
    /// Create a record in QUEUED for the given config.
    pub fn new(config: Arc<dyn SimulationConfig>, priority: i32) -> Self {
        Self {
            id: config.job_id().to_string(),
            config,
            status: JobStatus::Queued,
            priority,
            submitted_at: epoch_secs(),
            start_time: None,
            end_time: None,
            return_code: None,
            stdout_capture: String::new(),
            stderr_capture: String::new(),
            external_job_id: None,
            resource_snapshot: None,
            error: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn external_job_id(&self) -> Option<&str> {
        self.external_job_id.as_deref()
    }

    /// Move to `next`, enforcing the state machine.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// QUEUED -> SCHEDULED, recording the scheduler's own job id.
    pub fn mark_scheduled(&mut self, external_id: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Scheduled)?;
        self.external_job_id = Some(external_id.into());
        Ok(())
    }

    /// Transition to a terminal state and stamp `end_time`.
    pub fn finish(
        &mut self,
        status: JobStatus,
        return_code: Option<i32>,
        error: Option<String>,
    ) -> Result<(), TransitionError> {
        debug_assert!(status.is_terminal());
        self.transition(status)?;
        self.end_time = Some(epoch_secs());
        if return_code.is_some() {
            self.return_code = return_code;
        }
        if error.is_some() {
            self.error = error;
        }
        Ok(())
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.id.clone(),
            status: self.status,
            priority: self.priority,
            scheduler_type: self.config.scheduler_type(),
            submitted_at: self.submitted_at,
            start_time: self.start_time,
            end_time: self.end_time,
            return_code: self.return_code,
            external_job_id: self.external_job_id.clone(),
            error: self.error.clone(),
        }
    }

    pub fn detail(&self) -> JobDetail {
        JobDetail {
            summary: self.summary(),
            stdout: self.stdout_capture.clone(),
            stderr: self.stderr_capture.clone(),
            resource_snapshot: self.resource_snapshot.clone(),
            config: self.config.to_json(),
        }
    }
}

/// Serializable view of a job for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobStatus,
    pub priority: i32,
    pub scheduler_type: SchedulerType,
    pub submitted_at: u64,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub return_code: Option<i32>,
    pub external_job_id: Option<String>,
    pub error: Option<String>,
}

/// Full view of a single job, including captured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub summary: JobSummary,
    pub stdout: String,
    pub stderr: String,
    pub resource_snapshot: Option<ResourceSnapshot>,
    pub config: serde_json::Value,
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
