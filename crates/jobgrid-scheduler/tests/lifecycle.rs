//! Lifecycle scenarios for the job manager.
//!
//! Local jobs run `/bin/sh`; the external scheduler is a scripted command
//! runner, so no SLURM installation is needed.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jobgrid_bridge::{CommandOutput, SchedulerBridge, ScriptedRunner};
use jobgrid_core::{
    BoxFuture, JobEvent, JobStatus, LimitsUpdate, ResourceLimits, ResourceSnapshot,
    SchedulerType, SimulationConfig,
};
use jobgrid_scheduler::{JobError, JobLifecycleManager, ManagerConfig, RecordingNotifier};
use jobgrid_telemetry::TelemetryHandle;
use tokio::sync::watch;

// ── Helpers ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct TestJob {
    id: String,
    dir: PathBuf,
    exe: Option<PathBuf>,
    project: PathBuf,
    script: String,
    scheduler: SchedulerType,
    submission: Result<String, String>,
    panic_on_build: bool,
}

impl TestJob {
    fn shell(id: &str, dir: &Path, script: &str) -> Self {
        let project = dir.join("project.aedt");
        std::fs::write(&project, "model").unwrap();
        Self {
            id: id.to_string(),
            dir: dir.to_path_buf(),
            exe: Some(PathBuf::from("/bin/sh")),
            project,
            script: script.to_string(),
            scheduler: SchedulerType::None,
            submission: Err("local job".to_string()),
            panic_on_build: false,
        }
    }

    fn slurm(id: &str, dir: &Path, submission: Result<&str, &str>) -> Self {
        Self {
            scheduler: SchedulerType::Slurm,
            submission: submission.map(str::to_string).map_err(str::to_string),
            ..Self::shell(id, dir, "true")
        }
    }

    fn arc(self) -> Arc<dyn SimulationConfig> {
        Arc::new(self)
    }
}

impl SimulationConfig for TestJob {
    fn job_id(&self) -> &str {
        &self.id
    }

    fn working_directory(&self) -> &Path {
        &self.dir
    }

    fn ansys_edt_path(&self) -> Option<&Path> {
        self.exe.as_deref()
    }

    fn project_path(&self) -> &Path {
        &self.project
    }

    fn scheduler_type(&self) -> SchedulerType {
        self.scheduler
    }

    fn generate_command_list(&self) -> Vec<String> {
        if self.panic_on_build {
            panic!("broken configuration");
        }
        vec!["-c".to_string(), self.script.clone()]
    }

    fn submit_to_scheduler(&self) -> BoxFuture<'_, anyhow::Result<String>> {
        let result = self.submission.clone();
        Box::pin(async move { result.map_err(|e| anyhow::anyhow!(e)) })
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "jobid": self.id, "script": self.script })
    }
}

fn roomy() -> ResourceSnapshot {
    ResourceSnapshot {
        cpu_percent: 5.0,
        memory_free_gb: 64.0,
        disk_free_gb: 500.0,
        timestamp: 1,
        ..Default::default()
    }
}

fn busy() -> ResourceSnapshot {
    ResourceSnapshot {
        cpu_percent: 99.0,
        ..roomy()
    }
}

fn fast_config() -> ManagerConfig {
    ManagerConfig {
        dispatch_idle: Duration::from_millis(10),
        dispatch_backoff: Duration::from_millis(20),
        monitor_interval: Duration::from_secs(3600),
        cancel_grace: Duration::from_millis(300),
        output_drain: Duration::from_millis(200),
        ..Default::default()
    }
}

struct Harness {
    manager: JobLifecycleManager,
    events: Arc<RecordingNotifier>,
    telemetry: watch::Sender<ResourceSnapshot>,
    dir: tempfile::TempDir,
}

fn harness_with(limits: ResourceLimits, config: ManagerConfig, bridge: Option<SchedulerBridge>) -> Harness {
    let (tx, handle) = TelemetryHandle::channel(roomy());
    let events = Arc::new(RecordingNotifier::new());
    let mut builder = JobLifecycleManager::builder(handle)
        .limits(limits)
        .notifier(events.clone())
        .config(config);
    if let Some(bridge) = bridge {
        builder = builder.bridge(bridge);
    }
    Harness {
        manager: builder.build(),
        events,
        telemetry: tx,
        dir: tempfile::tempdir().unwrap(),
    }
}

fn harness() -> Harness {
    harness_with(ResourceLimits::default(), fast_config(), None)
}

fn slurm_harness() -> (Harness, Arc<ScriptedRunner>) {
    let runner = Arc::new(ScriptedRunner::new());
    let bridge = SchedulerBridge::with_runner(SchedulerType::Slurm, runner.clone()).unwrap();
    let limits = ResourceLimits {
        max_concurrent_jobs: 4,
        ..Default::default()
    };
    (harness_with(limits, fast_config(), Some(bridge)), runner)
}

async fn wait_for_status(manager: &JobLifecycleManager, id: &str, status: JobStatus) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if manager.job(id).await.map(|j| j.summary.status) == Some(status) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn started_order(events: &RecordingNotifier) -> Vec<String> {
    events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            JobEvent::JobStarted { job_id, .. } => Some(job_id),
            _ => None,
        })
        .collect()
}

// ── Local execution ─────────────────────────────────────────────

#[tokio::test]
async fn local_job_completes_with_output() {
    let h = harness();
    let job = TestJob::shell("ok", h.dir.path(), "echo hello; echo oops >&2");
    h.manager.submit(job.arc(), 0).await.unwrap();

    assert!(h.manager.wait_until_idle(Duration::from_secs(10)).await);
    let detail = h.manager.job("ok").await.unwrap();
    assert_eq!(detail.summary.status, JobStatus::Completed);
    assert_eq!(detail.summary.return_code, Some(0));
    assert_eq!(detail.stdout, "hello\n");
    assert!(detail.stderr.contains("oops"));
    assert!(detail.summary.start_time.is_some());
    assert!(detail.summary.end_time.is_some());
    assert_eq!(detail.resource_snapshot, Some(roomy()));
    assert_eq!(
        h.events.names_for("ok"),
        vec!["job_queued", "job_started", "job_completed"]
    );
    h.manager.shutdown();
}

#[tokio::test]
async fn nonzero_exit_fails() {
    let h = harness();
    h.manager
        .submit(TestJob::shell("bad", h.dir.path(), "exit 3").arc(), 0)
        .await
        .unwrap();

    assert!(h.manager.wait_until_idle(Duration::from_secs(10)).await);
    let summary = h.manager.job("bad").await.unwrap().summary;
    assert_eq!(summary.status, JobStatus::Failed);
    assert_eq!(summary.return_code, Some(3));
    assert!(summary.error.unwrap().contains("code 3"));
    h.manager.shutdown();
}

#[tokio::test]
async fn missing_executable_and_fallback_fails() {
    let h = harness();
    let mut job = TestJob::shell("noexe", h.dir.path(), "true");
    job.exe = Some(PathBuf::from("/nonexistent/ansysedt"));
    h.manager.submit(job.arc(), 0).await.unwrap();

    assert!(h.manager.wait_until_idle(Duration::from_secs(10)).await);
    let summary = h.manager.job("noexe").await.unwrap().summary;
    assert_eq!(summary.status, JobStatus::Failed);
    let error = summary.error.unwrap();
    assert!(error.contains("executable not found"), "{error}");
    assert!(error.contains("/nonexistent/ansysedt"));
    h.manager.shutdown();
}

#[tokio::test]
async fn output_is_kept_when_a_grandchild_holds_the_pipe() {
    let h = harness();
    let job = TestJob::shell("bg", h.dir.path(), "echo hello; sleep 5 &");
    h.manager.submit(job.arc(), 0).await.unwrap();

    assert!(h.manager.wait_until_idle(Duration::from_secs(10)).await);
    let detail = h.manager.job("bg").await.unwrap();
    assert_eq!(detail.summary.status, JobStatus::Completed);
    assert_eq!(detail.stdout, "hello\n");
}

#[tokio::test]
async fn manager_default_executable_is_used() {
    let config = ManagerConfig {
        default_executable: Some(PathBuf::from("/bin/sh")),
        ..fast_config()
    };
    let h = harness_with(ResourceLimits::default(), config, None);
    let mut job = TestJob::shell("fallback", h.dir.path(), "echo via default");
    job.exe = None;
    h.manager.submit(job.arc(), 0).await.unwrap();

    assert!(h.manager.wait_until_idle(Duration::from_secs(10)).await);
    let detail = h.manager.job("fallback").await.unwrap();
    assert_eq!(detail.summary.status, JobStatus::Completed);
    assert_eq!(detail.stdout.trim(), "via default");
    h.manager.shutdown();
}

#[tokio::test]
async fn missing_project_fails() {
    let h = harness();
    let mut job = TestJob::shell("noproj", h.dir.path(), "true");
    job.project = h.dir.path().join("missing.aedt");
    h.manager.submit(job.arc(), 0).await.unwrap();

    assert!(h.manager.wait_until_idle(Duration::from_secs(10)).await);
    let summary = h.manager.job("noproj").await.unwrap().summary;
    assert_eq!(summary.status, JobStatus::Failed);
    assert!(summary.error.unwrap().contains("project file not found"));
    h.manager.shutdown();
}

#[tokio::test]
async fn local_job_hits_time_limit() {
    let config = ManagerConfig {
        job_timeout: Duration::from_millis(300),
        ..fast_config()
    };
    let h = harness_with(ResourceLimits::default(), config, None);
    h.manager
        .submit(TestJob::shell("slow", h.dir.path(), "exec sleep 30").arc(), 0)
        .await
        .unwrap();

    let started = Instant::now();
    assert!(h.manager.wait_until_idle(Duration::from_secs(10)).await);
    assert!(started.elapsed() < Duration::from_secs(5));
    let summary = h.manager.job("slow").await.unwrap().summary;
    assert_eq!(summary.status, JobStatus::Failed);
    assert!(summary.error.unwrap().contains("timed out"));
    h.manager.shutdown();
}

#[tokio::test]
async fn panicking_task_marks_job_failed() {
    let h = harness();
    let mut job = TestJob::shell("boom", h.dir.path(), "true");
    job.panic_on_build = true;
    h.manager.submit(job.arc(), 0).await.unwrap();

    assert!(wait_for_status(&h.manager, "boom", JobStatus::Failed).await);
    assert!(h.manager.wait_until_idle(Duration::from_secs(10)).await);
    let summary = h.manager.job("boom").await.unwrap().summary;
    assert_eq!(summary.error.as_deref(), Some("execution task panicked"));

    // The dispatch loop survives and keeps admitting work.
    h.manager
        .submit(TestJob::shell("after", h.dir.path(), "true").arc(), 0)
        .await
        .unwrap();
    assert!(wait_for_status(&h.manager, "after", JobStatus::Completed).await);
    h.manager.shutdown();
}

// ── Admission and ordering ──────────────────────────────────────

#[tokio::test]
async fn higher_priority_dispatches_first_one_at_a_time() {
    let h = harness();
    h.telemetry.send_replace(busy());

    h.manager
        .submit(TestJob::shell("a", h.dir.path(), "sleep 0.1").arc(), 0)
        .await
        .unwrap();
    h.manager
        .submit(TestJob::shell("b", h.dir.path(), "sleep 0.1").arc(), 5)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(started_order(&h.events).is_empty());

    h.telemetry.send_replace(roomy());
    assert!(h.manager.wait_until_idle(Duration::from_secs(10)).await);
    assert_eq!(started_order(&h.events), vec!["b", "a"]);

    // With one slot, b finished before a started.
    let names: Vec<(String, &str)> = h
        .events
        .events()
        .iter()
        .filter(|e| matches!(e, JobEvent::JobStarted { .. } | JobEvent::JobCompleted { .. }))
        .map(|e| (e.job_id().unwrap_or_default().to_string(), e.name()))
        .collect();
    assert_eq!(
        names,
        vec![
            ("b".to_string(), "job_started"),
            ("b".to_string(), "job_completed"),
            ("a".to_string(), "job_started"),
            ("a".to_string(), "job_completed"),
        ]
    );
    h.manager.shutdown();
}

#[tokio::test]
async fn concurrency_limit_caps_running_jobs() {
    let limits = ResourceLimits {
        max_concurrent_jobs: 2,
        ..Default::default()
    };
    let h = harness_with(limits, fast_config(), None);
    for id in ["j1", "j2", "j3"] {
        h.manager
            .submit(TestJob::shell(id, h.dir.path(), "sleep 0.3").arc(), 0)
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(150)).await;
    let stats = h.manager.queue_stats().await;
    assert_eq!(stats.running_count, 2);
    assert_eq!(stats.total_queued, 1);

    assert!(h.manager.wait_until_idle(Duration::from_secs(10)).await);
    let counts = h.manager.status_counts().await;
    assert!(counts.contains(&(JobStatus::Completed, 3)));
    h.manager.shutdown();
}

#[tokio::test]
async fn reprioritised_job_jumps_the_queue() {
    let h = harness();
    h.telemetry.send_replace(busy());
    for id in ["x", "y", "z"] {
        h.manager
            .submit(TestJob::shell(id, h.dir.path(), "true").arc(), 0)
            .await
            .unwrap();
    }
    h.manager.set_priority("z", 9).await.unwrap();
    let stats = h.manager.queue_stats().await;
    assert_eq!(stats.per_bucket_counts.get(&9), Some(&1));
    assert_eq!(stats.fifo_queued, 2);

    h.telemetry.send_replace(roomy());
    assert!(h.manager.wait_until_idle(Duration::from_secs(10)).await);
    assert_eq!(started_order(&h.events), vec!["z", "x", "y"]);

    assert!(matches!(
        h.manager.set_priority("z", 1).await,
        Err(JobError::InvalidState { .. })
    ));
    assert!(matches!(
        h.manager.set_priority("ghost", 1).await,
        Err(JobError::NotFound(_))
    ));
    h.manager.shutdown();
}

// ── Submission validation ───────────────────────────────────────

#[tokio::test]
async fn duplicate_and_empty_ids_are_rejected() {
    let h = harness();
    h.telemetry.send_replace(busy());
    let job = TestJob::shell("dup", h.dir.path(), "true");
    h.manager.submit(job.clone().arc(), 0).await.unwrap();
    assert!(matches!(
        h.manager.submit(job.arc(), 3).await,
        Err(JobError::Duplicate(id)) if id == "dup"
    ));
    assert_eq!(h.manager.jobs().await.len(), 1);

    let empty = TestJob::shell("  ", h.dir.path(), "true");
    assert!(matches!(
        h.manager.submit(empty.arc(), 0).await,
        Err(JobError::Validation(_))
    ));

    let padded = TestJob::shell(" sim ", h.dir.path(), "true");
    assert!(matches!(
        h.manager.submit(padded.arc(), 0).await,
        Err(JobError::Validation(e)) if e.field == "jobid"
    ));
    assert_eq!(h.manager.jobs().await.len(), 1);
    h.manager.shutdown();
}

#[tokio::test]
async fn external_job_without_bridge_is_rejected() {
    let h = harness();
    let job = TestJob::slurm("ext", h.dir.path(), Ok("Submitted batch job 1"));
    let err = h.manager.submit(job.arc(), 0).await.unwrap_err();
    match err {
        JobError::Validation(v) => assert_eq!(v.field, "scheduler_type"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(h.manager.jobs().await.is_empty());
}

// ── Cancellation ────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_queued_job_never_runs() {
    let h = harness();
    h.telemetry.send_replace(busy());
    h.manager
        .submit(TestJob::shell("q", h.dir.path(), "true").arc(), 0)
        .await
        .unwrap();

    assert!(h.manager.cancel("q").await.unwrap());
    assert_eq!(h.manager.job("q").await.unwrap().summary.status, JobStatus::Cancelled);
    assert_eq!(h.manager.queue_stats().await.total_queued, 0);

    h.telemetry.send_replace(roomy());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.manager.job("q").await.unwrap().summary.status, JobStatus::Cancelled);
    assert_eq!(h.events.names_for("q"), vec!["job_queued", "job_completed"]);

    // Terminal and unknown jobs report false.
    assert!(!h.manager.cancel("q").await.unwrap());
    assert!(!h.manager.cancel("ghost").await.unwrap());
    h.manager.shutdown();
}

#[tokio::test]
async fn cancel_running_job_terminates_process() {
    let h = harness();
    h.manager
        .submit(TestJob::shell("long", h.dir.path(), "exec sleep 30").arc(), 0)
        .await
        .unwrap();
    assert!(wait_for_status(&h.manager, "long", JobStatus::Running).await);

    let started = Instant::now();
    assert!(h.manager.cancel("long").await.unwrap());
    assert!(started.elapsed() < Duration::from_secs(5));
    let summary = h.manager.job("long").await.unwrap().summary;
    assert_eq!(summary.status, JobStatus::Cancelled);
    assert!(summary.end_time.is_some());
    assert!(h.manager.wait_until_idle(Duration::from_secs(2)).await);
    h.manager.shutdown();
}

#[tokio::test]
async fn cancel_force_kills_after_grace() {
    let h = harness();
    let script = "trap '' TERM; while true; do sleep 0.05; done";
    h.manager
        .submit(TestJob::shell("stubborn", h.dir.path(), script).arc(), 0)
        .await
        .unwrap();
    assert!(wait_for_status(&h.manager, "stubborn", JobStatus::Running).await);
    // Give the shell time to install its trap.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(h.manager.cancel("stubborn").await.unwrap());
    assert_eq!(
        h.manager.job("stubborn").await.unwrap().summary.status,
        JobStatus::Cancelled
    );
    h.manager.shutdown();
}

// ── Limits ──────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_limit_edit_changes_nothing() {
    let h = harness();
    let before = h.manager.limits().await;
    let update = LimitsUpdate {
        max_cpu_percent: Some(-5.0),
        ..Default::default()
    };
    assert!(matches!(
        h.manager.edit_limits(&update).await,
        Err(JobError::Validation(_))
    ));
    assert_eq!(h.manager.limits().await, before);
    assert!(h.events.events().is_empty());
}

#[tokio::test]
async fn limit_edit_applies_and_notifies() {
    let h = harness();
    let update = LimitsUpdate {
        max_concurrent_jobs: Some(3),
        min_disk_gb: Some(1.0),
        ..Default::default()
    };
    let new = h.manager.edit_limits(&update).await.unwrap();
    assert_eq!(new.max_concurrent_jobs, 3);
    assert_eq!(new.min_disk_gb, 1.0);
    assert_eq!(new.max_cpu_percent, ResourceLimits::default().max_cpu_percent);
    assert_eq!(h.manager.queue_stats().await.max_concurrent, 3);

    match h.events.events().as_slice() {
        [JobEvent::LimitsUpdated { old, new: announced }] => {
            assert_eq!(old.max_concurrent_jobs, 1);
            assert_eq!(announced, &new);
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

// ── External scheduler path ─────────────────────────────────────

#[tokio::test]
async fn padded_id_never_reaches_the_scheduler() {
    let (h, runner) = slurm_harness();
    let job = TestJob::slurm(" sim ", h.dir.path(), Ok("Submitted batch job 42\n"));
    assert!(matches!(
        h.manager.submit(job.arc(), 0).await,
        Err(JobError::Validation(_))
    ));
    assert!(h.manager.job("sim").await.is_none());
    assert!(h.manager.job(" sim ").await.is_none());
    assert_eq!(h.manager.queue_stats().await.running_count, 0);
    assert_eq!(h.manager.reconcile_once().await.unwrap(), 0);
    assert!(runner.calls().is_empty());
    h.manager.shutdown();
}

#[tokio::test]
async fn scheduled_job_follows_external_state() {
    let (h, runner) = slurm_harness();
    runner.push("squeue", CommandOutput::success("42|compute|me|PENDING|1|4|4G\n"));
    runner.push("squeue", CommandOutput::success("42|compute|me|RUNNING|1|4|4G\n"));
    runner.push("squeue", CommandOutput::success("7|compute|other|RUNNING|1|4|4G\n"));

    let job = TestJob::slurm("sim", h.dir.path(), Ok("Submitted batch job 42\n"));
    h.manager.submit(job.arc(), 0).await.unwrap();
    assert!(wait_for_status(&h.manager, "sim", JobStatus::Scheduled).await);
    let summary = h.manager.job("sim").await.unwrap().summary;
    assert_eq!(summary.external_job_id.as_deref(), Some("42"));
    assert!(summary.start_time.is_none());

    assert_eq!(h.manager.reconcile_once().await.unwrap(), 0);
    assert_eq!(h.manager.job("sim").await.unwrap().summary.status, JobStatus::Scheduled);

    assert_eq!(h.manager.reconcile_once().await.unwrap(), 1);
    let summary = h.manager.job("sim").await.unwrap().summary;
    assert_eq!(summary.status, JobStatus::Running);
    assert!(summary.start_time.is_some());

    // Gone from the queue with no log file: completed.
    assert_eq!(h.manager.reconcile_once().await.unwrap(), 1);
    let summary = h.manager.job("sim").await.unwrap().summary;
    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.return_code, Some(0));

    assert_eq!(
        h.events.names_for("sim"),
        vec!["job_queued", "job_scheduled", "job_started", "job_completed"]
    );
    assert_eq!(h.manager.queue_stats().await.running_count, 0);

    // Nothing tracked any more: no listing command is run.
    let calls = runner.calls().len();
    assert_eq!(h.manager.reconcile_once().await.unwrap(), 0);
    assert_eq!(runner.calls().len(), calls);
    h.manager.shutdown();
}

#[tokio::test]
async fn vanished_job_with_error_log_fails() {
    let (h, runner) = slurm_harness();
    runner.set("squeue", CommandOutput::success(""));
    std::fs::write(h.dir.path().join("solve.log"), "Simulation FAILED: license\n").unwrap();

    let job = TestJob::slurm("solve", h.dir.path(), Ok("Submitted batch job 9"));
    h.manager.submit(job.arc(), 0).await.unwrap();
    assert!(wait_for_status(&h.manager, "solve", JobStatus::Scheduled).await);

    assert_eq!(h.manager.reconcile_once().await.unwrap(), 1);
    let summary = h.manager.job("solve").await.unwrap().summary;
    assert_eq!(summary.status, JobStatus::Failed);
    assert_eq!(summary.return_code, Some(1));
    h.manager.shutdown();
}

#[tokio::test]
async fn listing_failure_leaves_jobs_alone() {
    let (h, runner) = slurm_harness();
    runner.set("squeue", CommandOutput::failure(1, "slurm_load_jobs error"));

    let job = TestJob::slurm("s", h.dir.path(), Ok("Submitted batch job 5"));
    h.manager.submit(job.arc(), 0).await.unwrap();
    assert!(wait_for_status(&h.manager, "s", JobStatus::Scheduled).await);

    assert!(matches!(
        h.manager.reconcile_once().await,
        Err(JobError::Scheduler(_))
    ));
    assert_eq!(h.manager.job("s").await.unwrap().summary.status, JobStatus::Scheduled);
    h.manager.shutdown();
}

#[tokio::test]
async fn submission_without_job_id_fails() {
    let (h, _runner) = slurm_harness();
    let job = TestJob::slurm("nosub", h.dir.path(), Ok("sbatch: error: invalid partition"));
    h.manager.submit(job.arc(), 0).await.unwrap();

    assert!(wait_for_status(&h.manager, "nosub", JobStatus::Failed).await);
    let summary = h.manager.job("nosub").await.unwrap().summary;
    assert!(summary.error.unwrap().contains("no job id"));
    assert!(summary.external_job_id.is_none());

    let job = TestJob::slurm("rejected", h.dir.path(), Err("sbatch exited with 1"));
    h.manager.submit(job.arc(), 0).await.unwrap();
    assert!(wait_for_status(&h.manager, "rejected", JobStatus::Failed).await);
    let error = h.manager.job("rejected").await.unwrap().summary.error.unwrap();
    assert!(error.contains("submission failed"), "{error}");
    h.manager.shutdown();
}

#[tokio::test]
async fn cancel_scheduled_job_uses_scheduler() {
    let (h, runner) = slurm_harness();
    runner.set("scancel", CommandOutput::failure(1, "scancel: error: Invalid job id"));

    let job = TestJob::slurm("c", h.dir.path(), Ok("Submitted batch job 77"));
    h.manager.submit(job.arc(), 0).await.unwrap();
    assert!(wait_for_status(&h.manager, "c", JobStatus::Scheduled).await);

    // A failing cancel command is reported and the job keeps its state.
    assert!(matches!(
        h.manager.cancel("c").await,
        Err(JobError::Scheduler(_))
    ));
    assert_eq!(h.manager.job("c").await.unwrap().summary.status, JobStatus::Scheduled);

    runner.set("scancel", CommandOutput::success(""));
    assert!(h.manager.cancel("c").await.unwrap());
    assert_eq!(h.manager.job("c").await.unwrap().summary.status, JobStatus::Cancelled);
    assert!(runner.calls().contains(&"scancel 77".to_string()));
    assert_eq!(h.manager.queue_stats().await.running_count, 0);
    h.manager.shutdown();
}

#[tokio::test]
async fn cancel_after_external_finish_leaves_outcome_to_monitor() {
    let (h, runner) = slurm_harness();
    runner.set(
        "scancel",
        CommandOutput::failure(1, "scancel: error: Kill job error on job id 78: Job/step already completing or completed"),
    );
    runner.push("squeue", CommandOutput::success(""));

    let job = TestJob::slurm("done", h.dir.path(), Ok("Submitted batch job 78"));
    h.manager.submit(job.arc(), 0).await.unwrap();
    assert!(wait_for_status(&h.manager, "done", JobStatus::Scheduled).await);

    assert!(!h.manager.cancel("done").await.unwrap());
    assert_eq!(h.manager.job("done").await.unwrap().summary.status, JobStatus::Scheduled);

    assert_eq!(h.manager.reconcile_once().await.unwrap(), 1);
    let summary = h.manager.job("done").await.unwrap().summary;
    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.return_code, Some(0));
    h.manager.shutdown();
}
