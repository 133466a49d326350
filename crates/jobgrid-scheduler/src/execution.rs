//! Per-job execution tasks: local subprocesses and external submission.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use jobgrid_bridge::parse_submission_id;
use jobgrid_core::{JobEvent, JobId, JobStatus, SimulationConfig, epoch_secs};

use crate::error::ExecutionError;
use crate::manager::{CancelAck, JobLifecycleManager};

/// Result of a local run, before it is written to the record.
struct LocalRun {
    status: JobStatus,
    return_code: Option<i32>,
    stdout: String,
    stderr: String,
    error: Option<String>,
    /// Answered once the record is final, when the run was cancelled.
    ack: Option<CancelAck>,
}

impl LocalRun {
    fn failed(error: ExecutionError) -> Self {
        Self {
            status: JobStatus::Failed,
            return_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error.to_string()),
            ack: None,
        }
    }
}

enum Ended {
    Exited(std::io::Result<ExitStatus>),
    Cancelled(CancelAck),
    TimedOut,
}

impl JobLifecycleManager {
    pub(crate) async fn execute(self, id: JobId) {
        let config = {
            let mut reg = self.inner.registry.lock().await;
            let Some(entry) = reg.jobs.get(&id) else {
                reg.pool.mark_finished(&id);
                return;
            };
            if entry.record.status() != JobStatus::Queued {
                // Cancelled between dispatch and now.
                debug!(job_id = %id, status = %entry.record.status(), "skipping execution");
                reg.pool.mark_finished(&id);
                return;
            }
            entry.record.config.clone()
        };

        if config.scheduler_type().is_external() {
            self.execute_scheduled(&id, config).await;
        } else {
            self.execute_local(&id, config).await;
        }
    }

    async fn execute_local(&self, id: &str, config: Arc<dyn SimulationConfig>) {
        let (stop_tx, stop_rx) = oneshot::channel();
        {
            let mut reg = self.inner.registry.lock().await;
            let reg = &mut *reg;
            let Some(entry) = reg.jobs.get_mut(id) else {
                return;
            };
            if let Err(e) = entry.record.transition(JobStatus::Running) {
                debug!(job_id = %id, error = %e, "job left QUEUED before it could start");
                reg.pool.mark_finished(id);
                return;
            }
            let start_time = epoch_secs();
            entry.record.start_time = Some(start_time);
            entry.record.resource_snapshot = Some(self.inner.telemetry.current());
            entry.cancel = Some(stop_tx);
            info!(job_id = %id, "job running");
            self.inner.notifier.emit(JobEvent::JobStarted {
                job_id: id.to_string(),
                start_time,
            });
        }

        let run = self.run_local(id, config.as_ref(), stop_rx).await;

        let mut reg = self.inner.registry.lock().await;
        if let Some(entry) = reg.jobs.get_mut(id) {
            entry.record.stdout_capture = run.stdout;
            entry.record.stderr_capture = run.stderr;
        }
        self.finish_locked(&mut reg, id, run.status, run.return_code, run.error);
        drop(reg);
        if let Some(ack) = run.ack {
            let _ = ack.send(());
        }
    }

    async fn run_local(
        &self,
        id: &str,
        config: &dyn SimulationConfig,
        mut stop_rx: oneshot::Receiver<CancelAck>,
    ) -> LocalRun {
        let program = match self.resolve_executable(config) {
            Ok(p) => p,
            Err(e) => return LocalRun::failed(e),
        };
        if !config.project_path().exists() {
            return LocalRun::failed(ExecutionError::ProjectNotFound(
                config.project_path().to_path_buf(),
            ));
        }

        let args = config.generate_command_list();
        debug!(job_id = %id, program = %program.display(), ?args, "spawning local job");
        let mut child = match Command::new(&program)
            .args(&args)
            .current_dir(config.working_directory())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(source) => return LocalRun::failed(ExecutionError::Spawn { program, source }),
        };
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let timeout = self.inner.config.job_timeout;
        let ended = tokio::select! {
            status = child.wait() => Ended::Exited(status),
            Ok(ack) = &mut stop_rx => Ended::Cancelled(ack),
            _ = tokio::time::sleep(timeout) => Ended::TimedOut,
        };

        let grace = self.inner.config.cancel_grace;
        let mut run = match ended {
            Ended::Exited(Ok(status)) if status.success() => LocalRun {
                status: JobStatus::Completed,
                return_code: status.code(),
                stdout: String::new(),
                stderr: String::new(),
                error: None,
                ack: None,
            },
            Ended::Exited(Ok(status)) => LocalRun {
                status: JobStatus::Failed,
                return_code: status.code(),
                stdout: String::new(),
                stderr: String::new(),
                error: Some(exit_message(status)),
                ack: None,
            },
            Ended::Exited(Err(e)) => LocalRun {
                status: JobStatus::Failed,
                return_code: None,
                stdout: String::new(),
                stderr: String::new(),
                error: Some(format!("failed to wait for process: {e}")),
                ack: None,
            },
            Ended::Cancelled(ack) => {
                info!(job_id = %id, "stopping local job");
                let code = terminate(&mut child, grace).await;
                LocalRun {
                    status: JobStatus::Cancelled,
                    return_code: code,
                    stdout: String::new(),
                    stderr: String::new(),
                    error: None,
                    ack: Some(ack),
                }
            }
            Ended::TimedOut => {
                warn!(job_id = %id, timeout_secs = timeout.as_secs(), "local job hit its time limit");
                terminate(&mut child, grace).await;
                LocalRun::failed(ExecutionError::Timeout(timeout))
            }
        };

        let drain_for = self.inner.config.output_drain;
        run.stdout = collect(stdout, drain_for).await;
        run.stderr = collect(stderr, drain_for).await;
        run
    }

    /// The job's own executable if it exists, else the manager default.
    fn resolve_executable(&self, config: &dyn SimulationConfig) -> Result<PathBuf, ExecutionError> {
        let own = config.ansys_edt_path();
        if let Some(path) = own.filter(|p| p.exists()) {
            return Ok(path.to_path_buf());
        }
        let fallback = self.inner.config.default_executable.as_deref();
        if let Some(path) = fallback.filter(|p| p.exists()) {
            debug!(job_id = config.job_id(), fallback = %path.display(), "using default executable");
            return Ok(path.to_path_buf());
        }
        let missing = own.or(fallback).unwrap_or(Path::new("ansysedt"));
        Err(ExecutionError::ExecutableNotFound(missing.to_path_buf()))
    }

    async fn execute_scheduled(&self, id: &str, config: Arc<dyn SimulationConfig>) {
        let kind = config.scheduler_type();
        let Some(bridge) = self.inner.bridge.clone().filter(|b| b.kind() == kind) else {
            let mut reg = self.inner.registry.lock().await;
            self.finish_locked(
                &mut reg,
                id,
                JobStatus::Failed,
                None,
                Some(format!("no {kind} scheduler configured")),
            );
            return;
        };

        {
            let mut reg = self.inner.registry.lock().await;
            if let Some(entry) = reg.jobs.get_mut(id) {
                entry.record.resource_snapshot = Some(self.inner.telemetry.current());
            }
        }

        info!(job_id = %id, scheduler = %kind, "submitting to external scheduler");
        let external_id = match config.submit_to_scheduler().await {
            Ok(stdout) => parse_submission_id(kind, &stdout)
                .ok_or_else(|| ExecutionError::SubmissionIdMissing(stdout.trim().to_string())),
            Err(e) => Err(ExecutionError::Submission(format!("{e:#}"))),
        };

        let mut reg = self.inner.registry.lock().await;
        let external_id = match external_id {
            Ok(external_id) => external_id,
            Err(e) => {
                warn!(job_id = %id, error = %e, "scheduler submission failed");
                self.finish_locked(&mut reg, id, JobStatus::Failed, None, Some(e.to_string()));
                return;
            }
        };

        let scheduled = match reg.jobs.get_mut(id) {
            Some(entry) => entry.record.mark_scheduled(external_id.clone()).is_ok(),
            None => false,
        };
        if !scheduled {
            drop(reg);
            // Cancelled while the submission was in flight.
            info!(job_id = %id, %external_id, "job cancelled during submission, cancelling external job");
            if let Err(e) = bridge.cancel_job(&external_id).await {
                warn!(job_id = %id, %external_id, error = %e, "external cancel failed");
            }
            return;
        }
        drop(reg);

        info!(job_id = %id, %external_id, "job scheduled");
        self.inner.notifier.emit(JobEvent::JobScheduled {
            job_id: id.to_string(),
            external_job_id: external_id,
        });
        self.ensure_monitor();
    }
}

/// A pipe being read in the background into a shared buffer.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

fn drain<R>(pipe: Option<R>) -> Capture
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let sink = buf.clone();
    let reader = tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
            }
        }
    });
    Capture { buf, reader }
}

/// Output read so far. A grandchild still holding the pipe open must not
/// keep the job from finishing, so the reader is stopped after `wait`.
async fn collect(capture: Capture, wait: Duration) -> String {
    let abort = capture.reader.abort_handle();
    if tokio::time::timeout(wait, capture.reader).await.is_err() {
        debug!(wait_ms = wait.as_millis() as u64, "output pipe still open, keeping partial output");
        abort.abort();
    }
    let buf = capture.buf.lock().await;
    String::from_utf8_lossy(&buf).into_owned()
}

/// SIGTERM, wait `grace`, then SIGKILL. Returns the exit code if the
/// process reported one.
async fn terminate(child: &mut Child, grace: Duration) -> Option<i32> {
    if let Some(code) = sigterm(child, grace).await {
        return code;
    }
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill process");
    }
    child.try_wait().ok().flatten().and_then(|s| s.code())
}

/// `Some(exit code)` if the process exited within `grace`.
#[cfg(unix)]
async fn sigterm(child: &mut Child, grace: Duration) -> Option<Option<i32>> {
    let pid = child.id()?;
    // SAFETY: `pid` is our own unreaped child, so it cannot have been recycled.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => Some(status.code()),
        _ => {
            warn!(pid, "process ignored SIGTERM, killing");
            None
        }
    }
}

#[cfg(not(unix))]
async fn sigterm(_child: &mut Child, _grace: Duration) -> Option<Option<i32>> {
    None
}

fn exit_message(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("process exited with code {code}"),
        None => format!("process terminated by signal ({status})"),
    }
}
