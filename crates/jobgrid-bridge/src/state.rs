//! Normalised external job states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Job state reported by an external scheduler, after normalisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalJobState {
    Pending,
    Running,
    Completing,
    Suspended,
    Completed,
    Failed,
    Cancelled,
    /// Raw text that matched no known state.
    Unknown(String),
}

impl ExternalJobState {
    /// SLURM long (`RUNNING`) or compact (`R`) state codes.
    pub fn from_slurm(raw: &str) -> Self {
        let s = raw.trim().to_ascii_uppercase();
        // `CANCELLED by 1000` style suffixes.
        let head = s.split_whitespace().next().unwrap_or("");
        match head {
            "PENDING" | "PD" | "CONFIGURING" | "CF" | "REQUEUED" | "RQ" | "REQUEUE_HOLD"
            | "RH" | "RESV_DEL_HOLD" | "RD" => ExternalJobState::Pending,
            "RUNNING" | "R" | "RESIZING" | "RS" | "SIGNALING" | "SI" | "STAGE_OUT" | "SO" => {
                ExternalJobState::Running
            }
            "COMPLETING" | "CG" => ExternalJobState::Completing,
            "SUSPENDED" | "S" | "STOPPED" | "ST" => ExternalJobState::Suspended,
            "COMPLETED" | "CD" => ExternalJobState::Completed,
            "FAILED" | "F" | "TIMEOUT" | "TO" | "NODE_FAIL" | "NF" | "OUT_OF_MEMORY" | "OOM"
            | "BOOT_FAIL" | "BF" | "DEADLINE" | "DL" | "PREEMPTED" | "PR" => {
                ExternalJobState::Failed
            }
            "CANCELLED" | "CA" | "REVOKED" | "RV" => ExternalJobState::Cancelled,
            _ => ExternalJobState::Unknown(raw.trim().to_string()),
        }
    }

    /// LSF `bjobs` STAT values.
    pub fn from_lsf(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PEND" | "WAIT" => ExternalJobState::Pending,
            "RUN" | "PROV" => ExternalJobState::Running,
            "PSUSP" | "USUSP" | "SSUSP" => ExternalJobState::Suspended,
            "DONE" => ExternalJobState::Completed,
            "EXIT" => ExternalJobState::Failed,
            _ => ExternalJobState::Unknown(raw.trim().to_string()),
        }
    }

    /// The scheduler itself reports the job finished.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExternalJobState::Completed | ExternalJobState::Failed | ExternalJobState::Cancelled
        )
    }
}

impl fmt::Display for ExternalJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalJobState::Pending => f.write_str("PENDING"),
            ExternalJobState::Running => f.write_str("RUNNING"),
            ExternalJobState::Completing => f.write_str("COMPLETING"),
            ExternalJobState::Suspended => f.write_str("SUSPENDED"),
            ExternalJobState::Completed => f.write_str("COMPLETED"),
            ExternalJobState::Failed => f.write_str("FAILED"),
            ExternalJobState::Cancelled => f.write_str("CANCELLED"),
            ExternalJobState::Unknown(raw) => write!(f, "UNKNOWN({raw})"),
        }
    }
}
