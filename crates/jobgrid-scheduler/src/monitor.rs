//! Scheduler monitor: reconciles SCHEDULED jobs against the external
//! scheduler's job table.
//!
//! A job still listed follows the scheduler's state. A job no longer
//! listed is presumed finished, and its batch log decides between
//! COMPLETED and FAILED. That inference is a heuristic: a scheduler hiccup
//! or a late log write can misclassify a job.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use jobgrid_bridge::ExternalJobState;
use jobgrid_core::{JobEvent, JobId, JobStatus, epoch_secs};

use crate::error::{JobError, JobResult};
use crate::manager::JobLifecycleManager;

/// Words in a batch log that mark the run as failed.
const FAILURE_MARKERS: [&str; 3] = ["error", "failed", "failure"];

/// A tracked job as seen at the start of a pass.
struct Tracked {
    id: JobId,
    external_id: String,
    log_path: PathBuf,
}

/// What a pass decided for one job.
enum Verdict {
    Started,
    Finished {
        status: JobStatus,
        return_code: i32,
        error: Option<String>,
    },
}

impl JobLifecycleManager {
    /// Start the monitor loop if a scheduler is configured and the loop is
    /// not running yet.
    pub fn ensure_monitor(&self) {
        if self.inner.bridge.is_none() {
            return;
        }
        if self
            .inner
            .monitor_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let manager = self.clone();
            let shutdown = self.inner.shutdown_tx.subscribe();
            tokio::spawn(manager.monitor_loop(shutdown));
        }
    }

    async fn monitor_loop(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.inner.config.monitor_interval;
        info!(interval_secs = interval.as_secs(), "scheduler monitor started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.reconcile_once().await {
                        Ok(0) => {}
                        Ok(n) => debug!(updated = n, "scheduler monitor pass"),
                        Err(e) => warn!(error = %e, "scheduler monitor pass failed, retrying next interval"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("scheduler monitor shutting down");
                    break;
                }
            }
        }
    }

    /// One reconciliation pass. Returns how many jobs changed state.
    ///
    /// A failing listing command is returned to the caller and changes
    /// nothing.
    pub async fn reconcile_once(&self) -> JobResult<usize> {
        let bridge = self.inner.bridge.as_ref().ok_or(JobError::NoScheduler)?;

        let tracked: Vec<Tracked> = {
            let reg = self.inner.registry.lock().await;
            reg.jobs
                .values()
                .filter(|e| matches!(e.record.status(), JobStatus::Scheduled | JobStatus::Running))
                .filter_map(|e| {
                    Some(Tracked {
                        id: e.record.id.clone(),
                        external_id: e.record.external_job_id()?.to_string(),
                        log_path: e.record.config.log_path(),
                    })
                })
                .collect()
        };
        if tracked.is_empty() {
            return Ok(0);
        }

        let listed: HashMap<String, ExternalJobState> = bridge
            .list_jobs()
            .await?
            .into_iter()
            .map(|j| (j.job_id, j.state))
            .collect();

        let mut verdicts = Vec::new();
        for job in tracked {
            let verdict = match listed.get(&job.external_id) {
                Some(state) => verdict_for_listed(state),
                None => Some(classify_log(&job.log_path).await),
            };
            if let Some(v) = verdict {
                verdicts.push((job, v));
            }
        }

        let mut changed = 0;
        let mut reg = self.inner.registry.lock().await;
        for (job, verdict) in verdicts {
            match verdict {
                Verdict::Started => {
                    let Some(entry) = reg.jobs.get_mut(&job.id) else {
                        continue;
                    };
                    if entry.record.status() != JobStatus::Scheduled
                        || entry.record.transition(JobStatus::Running).is_err()
                    {
                        continue;
                    }
                    let start_time = epoch_secs();
                    entry.record.start_time = Some(start_time);
                    info!(job_id = %job.id, external_id = %job.external_id, "external job running");
                    self.inner.notifier.emit(JobEvent::JobStarted {
                        job_id: job.id.clone(),
                        start_time,
                    });
                    changed += 1;
                }
                Verdict::Finished {
                    status,
                    return_code,
                    error,
                } => {
                    if self.finish_locked(&mut reg, &job.id, status, Some(return_code), error) {
                        changed += 1;
                    }
                }
            }
        }
        Ok(changed)
    }
}

/// Listed jobs: RUNNING advances, explicit terminal states are final,
/// everything else waits.
fn verdict_for_listed(state: &ExternalJobState) -> Option<Verdict> {
    match state {
        ExternalJobState::Running => Some(Verdict::Started),
        ExternalJobState::Completed => Some(Verdict::Finished {
            status: JobStatus::Completed,
            return_code: 0,
            error: None,
        }),
        ExternalJobState::Failed => Some(Verdict::Finished {
            status: JobStatus::Failed,
            return_code: 1,
            error: Some("scheduler reported the job failed".to_string()),
        }),
        ExternalJobState::Cancelled => Some(Verdict::Finished {
            status: JobStatus::Cancelled,
            return_code: 1,
            error: Some("cancelled outside jobgrid".to_string()),
        }),
        ExternalJobState::Pending
        | ExternalJobState::Completing
        | ExternalJobState::Suspended
        | ExternalJobState::Unknown(_) => None,
    }
}

/// Decide the outcome of a job that left the external queue from its log.
/// A missing or unreadable log counts as success.
async fn classify_log(path: &Path) -> Verdict {
    match tokio::fs::read_to_string(path).await {
        Ok(text) if has_failure_marker(&text) => Verdict::Finished {
            status: JobStatus::Failed,
            return_code: 1,
            error: Some(format!("batch log {} reports a failure", path.display())),
        },
        Ok(_) => Verdict::Finished {
            status: JobStatus::Completed,
            return_code: 0,
            error: None,
        },
        Err(e) => {
            debug!(log = %path.display(), error = %e, "no batch log, assuming success");
            Verdict::Finished {
                status: JobStatus::Completed,
                return_code: 0,
                error: None,
            }
        }
    }
}

fn has_failure_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    FAILURE_MARKERS.iter().any(|m| lower.contains(m))
}
