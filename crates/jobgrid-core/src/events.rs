//! Lifecycle events announced to observers.

use serde::{Deserialize, Serialize};

use crate::limits::ResourceLimits;
use crate::types::{JobId, JobStatus};

/// A fire-and-forget notification. Serializes as
/// `{"event": "<name>", ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    JobQueued {
        job_id: JobId,
        priority: i32,
    },
    JobStarted {
        job_id: JobId,
        start_time: u64,
    },
    JobScheduled {
        job_id: JobId,
        external_job_id: String,
    },
    JobCompleted {
        job_id: JobId,
        status: JobStatus,
        return_code: Option<i32>,
        error: Option<String>,
    },
    LimitsUpdated {
        old: ResourceLimits,
        new: ResourceLimits,
    },
}

impl JobEvent {
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::JobQueued { .. } => "job_queued",
            JobEvent::JobStarted { .. } => "job_started",
            JobEvent::JobScheduled { .. } => "job_scheduled",
            JobEvent::JobCompleted { .. } => "job_completed",
            JobEvent::LimitsUpdated { .. } => "limits_updated",
        }
    }

    /// The job this event concerns, if any.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            JobEvent::JobQueued { job_id, .. }
            | JobEvent::JobStarted { job_id, .. }
            | JobEvent::JobScheduled { job_id, .. }
            | JobEvent::JobCompleted { job_id, .. } => Some(job_id),
            JobEvent::LimitsUpdated { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_tag_matches_name() {
        let ev = JobEvent::JobCompleted {
            job_id: "a".into(),
            status: JobStatus::Failed,
            return_code: Some(2),
            error: None,
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], ev.name());
        assert_eq!(v["status"], "failed");
        assert_eq!(ev.job_id(), Some("a"));
    }
}
