//! Command execution seam between the bridge and the scheduler CLIs.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use jobgrid_core::BoxFuture;

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs a program with arguments and captures its output.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
    ) -> BoxFuture<'a, io::Result<CommandOutput>>;
}

/// Runs commands with `tokio::process`, bounded by a timeout.
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
    ) -> BoxFuture<'a, io::Result<CommandOutput>> {
        Box::pin(async move {
            debug!(program, ?args, "running scheduler command");
            let child = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output();

            let output = match tokio::time::timeout(self.timeout, child).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(program, timeout_secs = self.timeout.as_secs(), "scheduler command timed out");
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("{program} timed out after {:?}", self.timeout),
                    ));
                }
            };

            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

/// Replays canned output per program name.
///
/// Each program has a queue of responses; the last one repeats once the
/// queue is down to a single entry. Unknown programs fail with
/// `NotFound`, like a missing binary. Lets the bridge and everything
/// above it run without a scheduler installation.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `output` as the next response for `program`.
    pub fn push(&self, program: &str, output: CommandOutput) {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        responses.entry(program.to_string()).or_default().push_back(output);
    }

    /// Drop queued responses for `program` and answer with `output` from now on.
    pub fn set(&self, program: &str, output: CommandOutput) {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        responses.insert(program.to_string(), VecDeque::from([output]));
    }

    /// Command lines seen so far, as `program arg1 arg2`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next(&self, program: &str) -> Option<CommandOutput> {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        let queue = responses.get_mut(program)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
    ) -> BoxFuture<'a, io::Result<CommandOutput>> {
        Box::pin(async move {
            let mut line = program.to_string();
            for a in args {
                line.push(' ');
                line.push_str(a);
            }
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(line);

            self.next(program).ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("{program}: command not found"))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_runner_replays_then_repeats_last() {
        let runner = ScriptedRunner::new();
        runner.push("squeue", CommandOutput::success("first"));
        runner.push("squeue", CommandOutput::success("second"));

        let a = runner.run("squeue", &[]).await.unwrap();
        let b = runner.run("squeue", &[]).await.unwrap();
        let c = runner.run("squeue", &["-h".to_string()]).await.unwrap();
        assert_eq!(a.stdout, "first");
        assert_eq!(b.stdout, "second");
        assert_eq!(c.stdout, "second");
        assert_eq!(runner.calls(), vec!["squeue", "squeue", "squeue -h"]);
    }

    #[tokio::test]
    async fn scripted_runner_unknown_program() {
        let runner = ScriptedRunner::new();
        let err = runner.run("bjobs", &[]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_runner_captures_exit_code() {
        let runner = SystemCommandRunner::default();
        let out = runner
            .run("sh", &["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()])
            .await
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_runner_times_out() {
        let runner = SystemCommandRunner::new(Duration::from_millis(100));
        let err = runner
            .run("sh", &["-c".to_string(), "sleep 5".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
