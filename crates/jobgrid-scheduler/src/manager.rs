//! JobLifecycleManager: the job registry, the dispatch loop and the
//! caller-facing operations.
//!
//! All job state sits behind one async mutex. No lock is held across a
//! process spawn, a process wait, a scheduler command or a log read.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, oneshot, watch};
use tracing::{debug, error, info};

use jobgrid_bridge::SchedulerBridge;
use jobgrid_core::{
    DaemonConfig, JobDetail, JobEvent, JobId, JobRecord, JobStatus, JobSummary, LimitsUpdate,
    ResourceLimits, ResourceSnapshot, SimulationConfig, ValidationError,
};
use jobgrid_telemetry::TelemetryHandle;

use crate::error::{ExecutionError, JobError, JobResult};
use crate::notifier::{Notifier, TracingNotifier};
use crate::pool::{JobPool, QueueStats};

/// Hard ceiling on a local job's run time.
pub const LOCAL_JOB_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Runtime knobs for the manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Used when a job's own executable path is missing or absent.
    pub default_executable: Option<PathBuf>,
    /// Dispatch sleep when nothing is queued.
    pub dispatch_idle: Duration,
    /// Dispatch sleep when admission is refused.
    pub dispatch_backoff: Duration,
    pub monitor_interval: Duration,
    /// SIGTERM-to-SIGKILL delay when stopping a local job.
    pub cancel_grace: Duration,
    pub job_timeout: Duration,
    /// How long to keep reading a job's output once the process is gone.
    /// A grandchild holding the pipe open is cut off after this.
    pub output_drain: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_executable: None,
            dispatch_idle: Duration::from_secs(1),
            dispatch_backoff: Duration::from_secs(5),
            monitor_interval: Duration::from_secs(5),
            cancel_grace: Duration::from_secs(5),
            job_timeout: LOCAL_JOB_TIMEOUT,
            output_drain: Duration::from_secs(5),
        }
    }
}

impl ManagerConfig {
    pub fn from_daemon(config: &DaemonConfig) -> Self {
        let intervals = &config.intervals;
        Self {
            default_executable: config.execution.default_executable.clone(),
            dispatch_idle: Duration::from_millis(intervals.dispatch_idle_ms),
            dispatch_backoff: Duration::from_millis(intervals.dispatch_backoff_ms),
            monitor_interval: Duration::from_secs(intervals.monitor_secs),
            cancel_grace: Duration::from_secs(intervals.cancel_grace_secs),
            job_timeout: LOCAL_JOB_TIMEOUT,
            ..Self::default()
        }
    }
}

/// Sent to a running local job to stop it; the job answers on the
/// enclosed sender once its record is final.
pub(crate) type CancelAck = oneshot::Sender<()>;

pub(crate) struct JobEntry {
    pub(crate) record: JobRecord,
    /// Present while a local execution task can be asked to stop.
    pub(crate) cancel: Option<oneshot::Sender<CancelAck>>,
}

pub(crate) struct Registry {
    pub(crate) jobs: HashMap<JobId, JobEntry>,
    /// Submission order, for listings.
    order: Vec<JobId>,
    pub(crate) pool: JobPool,
}

pub(crate) struct Inner {
    pub(crate) registry: Mutex<Registry>,
    pub(crate) telemetry: TelemetryHandle,
    pub(crate) bridge: Option<SchedulerBridge>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) config: ManagerConfig,
    pub(crate) shutdown_tx: watch::Sender<bool>,
    /// Pokes the dispatch loop when a job is queued or a slot frees up.
    pub(crate) wake: Notify,
    dispatch_started: AtomicBool,
    pub(crate) monitor_started: AtomicBool,
}

/// Builder for [`JobLifecycleManager`].
pub struct ManagerBuilder {
    telemetry: TelemetryHandle,
    limits: ResourceLimits,
    bridge: Option<SchedulerBridge>,
    notifier: Arc<dyn Notifier>,
    config: ManagerConfig,
}

impl ManagerBuilder {
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn bridge(mut self, bridge: SchedulerBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> JobLifecycleManager {
        let (shutdown_tx, _) = watch::channel(false);
        JobLifecycleManager {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    jobs: HashMap::new(),
                    order: Vec::new(),
                    pool: JobPool::new(self.limits),
                }),
                telemetry: self.telemetry,
                bridge: self.bridge,
                notifier: self.notifier,
                config: self.config,
                shutdown_tx,
                wake: Notify::new(),
                dispatch_started: AtomicBool::new(false),
                monitor_started: AtomicBool::new(false),
            }),
        }
    }
}

/// Owns every job record and is the only writer of job status.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct JobLifecycleManager {
    pub(crate) inner: Arc<Inner>,
}

enum Dispatch {
    Started,
    Idle,
    Blocked,
}

impl JobLifecycleManager {
    pub fn builder(telemetry: TelemetryHandle) -> ManagerBuilder {
        ManagerBuilder {
            telemetry,
            limits: ResourceLimits::default(),
            bridge: None,
            notifier: Arc::new(TracingNotifier),
            config: ManagerConfig::default(),
        }
    }

    /// Register a job in QUEUED state and make sure the dispatch loop runs.
    pub async fn submit(
        &self,
        config: Arc<dyn SimulationConfig>,
        priority: i32,
    ) -> JobResult<JobId> {
        let id = config.job_id().to_string();
        if id.trim().is_empty() {
            return Err(ValidationError::new("jobid", "must not be empty").into());
        }
        // The id keys the registry, the scheduler log file and every event.
        if id.trim() != id {
            return Err(ValidationError::new(
                "jobid",
                "must not have leading or trailing whitespace",
            )
            .into());
        }
        let kind = config.scheduler_type();
        if kind.is_external() {
            match &self.inner.bridge {
                Some(bridge) if bridge.kind() == kind => {}
                Some(bridge) => {
                    return Err(ValidationError::new(
                        "scheduler_type",
                        format!("job wants {kind} but the manager drives {}", bridge.kind()),
                    )
                    .into());
                }
                None => {
                    return Err(ValidationError::new(
                        "scheduler_type",
                        format!("job wants {kind} but no external scheduler is configured"),
                    )
                    .into());
                }
            }
        }

        {
            let mut reg = self.inner.registry.lock().await;
            if reg.jobs.contains_key(&id) {
                return Err(JobError::Duplicate(id));
            }
            let record = JobRecord::new(config, priority);
            reg.jobs.insert(id.clone(), JobEntry { record, cancel: None });
            reg.order.push(id.clone());
            reg.pool.add_job(&id, priority);
        }

        info!(job_id = %id, priority, scheduler = %kind, "job queued");
        self.inner.notifier.emit(JobEvent::JobQueued {
            job_id: id.clone(),
            priority,
        });
        self.inner.wake.notify_one();
        self.ensure_dispatch();
        Ok(id)
    }

    /// Start the dispatch loop if it is not running yet.
    pub fn ensure_dispatch(&self) {
        if self
            .inner
            .dispatch_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let manager = self.clone();
            let shutdown = self.inner.shutdown_tx.subscribe();
            tokio::spawn(manager.dispatch_loop(shutdown));
        }
    }

    async fn dispatch_loop(self, mut shutdown: watch::Receiver<bool>) {
        info!("dispatch loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let wait = match self.dispatch_once().await {
                Dispatch::Started => continue,
                Dispatch::Idle => self.inner.config.dispatch_idle,
                Dispatch::Blocked => self.inner.config.dispatch_backoff,
            };
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.inner.wake.notified() => {}
                _ = shutdown.changed() => break,
            }
        }
        info!("dispatch loop stopped");
    }

    /// One admission decision. Never waits on a job.
    async fn dispatch_once(&self) -> Dispatch {
        let id = {
            let mut reg = self.inner.registry.lock().await;
            if reg.pool.queued_count() == 0 {
                return Dispatch::Idle;
            }
            let snapshot = self.inner.telemetry.current();
            if !reg.pool.can_start_job(&snapshot) {
                debug!(
                    running = reg.pool.running_count(),
                    cpu = snapshot.cpu_percent,
                    memory_free_gb = snapshot.memory_free_gb,
                    disk_free_gb = snapshot.disk_free_gb,
                    "admission refused"
                );
                return Dispatch::Blocked;
            }
            let Some(id) = reg.pool.get_next_job() else {
                return Dispatch::Idle;
            };
            reg.pool.mark_running(&id);
            id
        };
        debug!(job_id = %id, "job admitted");
        self.spawn_supervised(id);
        Dispatch::Started
    }

    /// Run the job's execution task under a supervisor that turns a panic
    /// into a FAILED record.
    fn spawn_supervised(&self, id: JobId) {
        let manager = self.clone();
        tokio::spawn(async move {
            let task = tokio::spawn(manager.clone().execute(id.clone()));
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(job_id = %id, "execution task panicked");
                    let mut reg = manager.inner.registry.lock().await;
                    manager.finish_locked(
                        &mut reg,
                        &id,
                        JobStatus::Failed,
                        None,
                        Some(ExecutionError::Panicked.to_string()),
                    );
                    // A terminal record may have been left holding its slot.
                    reg.pool.mark_finished(&id);
                }
            }
        });
    }

    /// Move a job to a terminal state, release its slot and announce it.
    /// Returns false when the record was already terminal.
    pub(crate) fn finish_locked(
        &self,
        reg: &mut Registry,
        id: &str,
        status: JobStatus,
        return_code: Option<i32>,
        error: Option<String>,
    ) -> bool {
        let Some(entry) = reg.jobs.get_mut(id) else {
            return false;
        };
        if let Err(e) = entry.record.finish(status, return_code, error) {
            debug!(job_id = %id, error = %e, "ignoring late transition");
            if entry.record.status().is_terminal() && reg.pool.mark_finished(id) {
                self.inner.wake.notify_one();
            }
            return false;
        }
        entry.cancel = None;
        let record = &entry.record;
        let event = JobEvent::JobCompleted {
            job_id: id.to_string(),
            status: record.status(),
            return_code: record.return_code,
            error: record.error.clone(),
        };
        match status {
            JobStatus::Failed => info!(
                job_id = %id,
                return_code = ?record.return_code,
                error = record.error.as_deref().unwrap_or(""),
                "job failed"
            ),
            _ => info!(job_id = %id, status = %status, return_code = ?record.return_code, "job finished"),
        }
        reg.pool.mark_finished(id);
        self.inner.notifier.emit(event);
        self.inner.wake.notify_one();
        true
    }

    /// Cancel a job.
    ///
    /// Returns `Ok(false)` for unknown or already terminal jobs, and for an
    /// external job the scheduler reports as already finished. A failing
    /// external cancel command leaves the job untouched and is returned
    /// as [`JobError::Scheduler`].
    pub async fn cancel(&self, id: &str) -> JobResult<bool> {
        let mut reg = self.inner.registry.lock().await;
        let Some(entry) = reg.jobs.get_mut(id) else {
            return Ok(false);
        };
        let status = entry.record.status();
        if status.is_terminal() {
            return Ok(false);
        }

        if let Some(external_id) = entry.record.external_job_id().map(str::to_string) {
            drop(reg);
            return self.cancel_external(id, &external_id).await;
        }

        match status {
            JobStatus::Queued => {
                // Also covers a job popped by dispatch whose execution task
                // has not claimed it yet, or one mid scheduler submission.
                reg.pool.remove_job(id);
                let done = self.finish_locked(&mut reg, id, JobStatus::Cancelled, None, None);
                Ok(done)
            }
            JobStatus::Running => {
                let Some(stop) = entry.cancel.take() else {
                    // Another cancel is already stopping it.
                    return Ok(false);
                };
                drop(reg);
                let (ack_tx, ack_rx) = oneshot::channel();
                if stop.send(ack_tx).is_ok() {
                    let budget = self.inner.config.cancel_grace + Duration::from_secs(5);
                    let _ = tokio::time::timeout(budget, ack_rx).await;
                }
                let reg = self.inner.registry.lock().await;
                Ok(reg
                    .jobs
                    .get(id)
                    .is_some_and(|e| e.record.status() == JobStatus::Cancelled))
            }
            _ => Ok(false),
        }
    }

    async fn cancel_external(&self, id: &str, external_id: &str) -> JobResult<bool> {
        let bridge = self.inner.bridge.as_ref().ok_or(JobError::NoScheduler)?;
        if !bridge.cancel_job(external_id).await? {
            // Ended on its own; the monitor records the real outcome.
            debug!(job_id = %id, external_id, "external job already finished");
            return Ok(false);
        }
        let mut reg = self.inner.registry.lock().await;
        Ok(self.finish_locked(&mut reg, id, JobStatus::Cancelled, None, None))
    }

    /// Re-queue a QUEUED job at a new priority.
    pub async fn set_priority(&self, id: &str, priority: i32) -> JobResult<()> {
        let mut reg = self.inner.registry.lock().await;
        let reg = &mut *reg;
        let entry = reg
            .jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        let status = entry.record.status();
        if status != JobStatus::Queued || !reg.pool.is_queued(id) {
            return Err(JobError::InvalidState {
                job_id: id.to_string(),
                status,
                expected: JobStatus::Queued,
            });
        }
        reg.pool.remove_job(id);
        reg.pool.add_job(id, priority);
        let old = std::mem::replace(&mut entry.record.priority, priority);
        info!(job_id = %id, old, new = priority, "job reprioritised");
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Validate and apply a partial limits update as a whole.
    pub async fn edit_limits(&self, update: &LimitsUpdate) -> JobResult<ResourceLimits> {
        let (old, new) = {
            let mut reg = self.inner.registry.lock().await;
            let old = reg.pool.limits().clone();
            let new = old.apply(update)?;
            reg.pool.set_limits(new.clone());
            (old, new)
        };
        info!(?old, ?new, "resource limits updated");
        self.inner.notifier.emit(JobEvent::LimitsUpdated {
            old,
            new: new.clone(),
        });
        self.inner.wake.notify_one();
        Ok(new)
    }

    /// Summaries of every job, in submission order.
    pub async fn jobs(&self) -> Vec<JobSummary> {
        let reg = self.inner.registry.lock().await;
        reg.order
            .iter()
            .filter_map(|id| reg.jobs.get(id))
            .map(|e| e.record.summary())
            .collect()
    }

    pub async fn job(&self, id: &str) -> Option<JobDetail> {
        let reg = self.inner.registry.lock().await;
        reg.jobs.get(id).map(|e| e.record.detail())
    }

    /// Number of jobs in each state, zeros included.
    pub async fn status_counts(&self) -> Vec<(JobStatus, usize)> {
        let reg = self.inner.registry.lock().await;
        JobStatus::ALL
            .iter()
            .map(|&s| {
                let n = reg.jobs.values().filter(|e| e.record.status() == s).count();
                (s, n)
            })
            .collect()
    }

    pub async fn queue_stats(&self) -> QueueStats {
        self.inner.registry.lock().await.pool.get_queue_stats()
    }

    pub async fn limits(&self) -> ResourceLimits {
        self.inner.registry.lock().await.pool.limits().clone()
    }

    pub fn telemetry(&self) -> ResourceSnapshot {
        self.inner.telemetry.current()
    }

    pub fn bridge(&self) -> Option<&SchedulerBridge> {
        self.inner.bridge.as_ref()
    }

    /// Receiver that flips to `true` on [`shutdown`](Self::shutdown).
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown_tx.subscribe()
    }

    /// Stop the dispatch and monitor loops. Running jobs are left alone.
    pub fn shutdown(&self) {
        info!("job manager shutting down");
        self.inner.shutdown_tx.send_replace(true);
    }

    /// Wait until nothing is queued or running. False on timeout.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let poll = async {
            loop {
                {
                    let reg = self.inner.registry.lock().await;
                    if reg.pool.queued_count() == 0 && reg.pool.running_count() == 0 {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }
}
