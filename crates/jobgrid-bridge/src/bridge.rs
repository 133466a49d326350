//! Scheduler-agnostic facade over the SLURM and LSF command lines.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use jobgrid_core::SchedulerType;

use crate::error::{BridgeError, BridgeResult};
use crate::runner::{CommandOutput, CommandRunner, SystemCommandRunner};
use crate::state::ExternalJobState;
use crate::{lsf, slurm};

/// One SLURM partition or LSF queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub name: String,
    pub nodes_total: u32,
    pub nodes_used: u32,
    pub cores_total: u32,
    pub cores_used: u32,
    pub memory_total_gb: f64,
    pub memory_used_gb: f64,
}

/// One row of the scheduler's global job table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalJob {
    pub job_id: String,
    pub partition: String,
    pub user: String,
    pub state: ExternalJobState,
    pub nodes: u32,
    pub cpus: u32,
    pub memory_gb: f64,
}

/// Lists partitions and jobs on, and cancels jobs in, one external
/// scheduler.
#[derive(Clone)]
pub struct SchedulerBridge {
    kind: SchedulerType,
    runner: Arc<dyn CommandRunner>,
}

impl fmt::Debug for SchedulerBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerBridge")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl SchedulerBridge {
    /// Bridge that shells out to the real scheduler binaries.
    pub fn new(kind: SchedulerType) -> BridgeResult<Self> {
        Self::with_runner(kind, Arc::new(SystemCommandRunner::default()))
    }

    pub fn with_runner(kind: SchedulerType, runner: Arc<dyn CommandRunner>) -> BridgeResult<Self> {
        if !kind.is_external() {
            return Err(BridgeError::Unsupported);
        }
        info!(scheduler = %kind, "scheduler bridge configured");
        Ok(Self { kind, runner })
    }

    pub fn kind(&self) -> SchedulerType {
        self.kind
    }

    pub async fn list_partitions(&self) -> BridgeResult<Vec<PartitionInfo>> {
        match self.kind {
            SchedulerType::Slurm => {
                let out = self.run_checked(slurm::SINFO, &slurm::sinfo_args()).await?;
                slurm::parse_sinfo(&out.stdout)
            }
            SchedulerType::Lsf => {
                let out = self.run_checked(lsf::BQUEUES, &lsf::bqueues_args()).await?;
                lsf::parse_bqueues(&out.stdout)
            }
            SchedulerType::None => Err(BridgeError::Unsupported),
        }
    }

    pub async fn list_jobs(&self) -> BridgeResult<Vec<ExternalJob>> {
        match self.kind {
            SchedulerType::Slurm => {
                let out = self.run_checked(slurm::SQUEUE, &slurm::squeue_args()).await?;
                slurm::parse_squeue(&out.stdout)
            }
            SchedulerType::Lsf => {
                let args = lsf::bjobs_args();
                let out = self.run(lsf::BJOBS, &args).await?;
                if !out.is_success()
                    && (lsf::is_empty_listing(&out.stderr) || lsf::is_empty_listing(&out.stdout))
                {
                    return Ok(Vec::new());
                }
                let out = check(lsf::BJOBS, out)?;
                lsf::parse_bjobs(&out.stdout)
            }
            SchedulerType::None => Err(BridgeError::Unsupported),
        }
    }

    /// Ask the scheduler to cancel `external_id`.
    ///
    /// `Ok(false)` means the scheduler reports the job already finished,
    /// so there was nothing to cancel. Any other failure is an error.
    pub async fn cancel_job(&self, external_id: &str) -> BridgeResult<bool> {
        let (program, args, already_finished): (&str, Vec<String>, fn(&str) -> bool) =
            match self.kind {
                SchedulerType::Slurm => (
                    slurm::SCANCEL,
                    slurm::scancel_args(external_id),
                    slurm::is_already_finished,
                ),
                SchedulerType::Lsf => (
                    lsf::BKILL,
                    lsf::bkill_args(external_id),
                    lsf::is_already_finished,
                ),
                SchedulerType::None => return Err(BridgeError::Unsupported),
            };
        let out = self.run(program, &args).await?;
        if already_finished(&out.stderr) || already_finished(&out.stdout) {
            info!(scheduler = %self.kind, external_id, "external job already finished");
            return Ok(false);
        }
        check(program, out)?;
        info!(scheduler = %self.kind, external_id, "external job cancelled");
        Ok(true)
    }

    async fn run(&self, program: &str, args: &[String]) -> BridgeResult<CommandOutput> {
        let out = self
            .runner
            .run(program, args)
            .await
            .map_err(|source| BridgeError::Spawn {
                command: program.to_string(),
                source,
            })?;
        debug!(program, code = ?out.code, "scheduler command finished");
        Ok(out)
    }

    async fn run_checked(&self, program: &str, args: &[String]) -> BridgeResult<CommandOutput> {
        let out = self.run(program, args).await?;
        check(program, out)
    }
}

fn check(program: &str, out: CommandOutput) -> BridgeResult<CommandOutput> {
    if out.is_success() {
        Ok(out)
    } else {
        Err(BridgeError::Command {
            command: program.to_string(),
            code: out.code,
            stderr: out.stderr.trim().to_string(),
        })
    }
}

/// Pull the scheduler-assigned id out of submission output.
pub fn parse_submission_id(kind: SchedulerType, stdout: &str) -> Option<String> {
    match kind {
        SchedulerType::Slurm => slurm::parse_submission(stdout),
        SchedulerType::Lsf => lsf::parse_submission(stdout),
        SchedulerType::None => None,
    }
}
