//! The simulation configuration contract.
//!
//! The orchestrator treats a job's configuration as opaque: it only needs
//! the handful of accessors in [`SimulationConfig`] to validate paths,
//! build a command line, or hand the job to an external scheduler.
//! [`BatchJobConfig`] is the serde-backed implementation accepted over
//! the REST API.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::types::SchedulerType;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the orchestrator needs from a job configuration.
pub trait SimulationConfig: fmt::Debug + Send + Sync {
    /// Unique job identifier.
    fn job_id(&self) -> &str;

    fn working_directory(&self) -> &Path;

    /// Solver executable requested by the job, if any.
    fn ansys_edt_path(&self) -> Option<&Path>;

    fn project_path(&self) -> &Path;

    fn scheduler_type(&self) -> SchedulerType;

    /// Arguments passed to the resolved executable for a local run.
    fn generate_command_list(&self) -> Vec<String>;

    /// Submit to the external scheduler and return its raw stdout.
    fn submit_to_scheduler(&self) -> BoxFuture<'_, anyhow::Result<String>>;

    /// Serialized form, for job detail views.
    fn to_json(&self) -> serde_json::Value;

    /// Log written by the batch job; read when the job leaves the
    /// external queue.
    fn log_path(&self) -> PathBuf {
        self.working_directory()
            .join(format!("{}.log", self.job_id()))
    }
}

/// Solver invocation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    pub num_cores: u32,
    pub distributed: bool,
    pub design_name: Option<String>,
    /// Passed as `-batchoptions "k=v ..."`.
    pub batch_options: BTreeMap<String, String>,
    pub extra_args: Vec<String>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            num_cores: 1,
            distributed: false,
            design_name: None,
            batch_options: BTreeMap::new(),
            extra_args: Vec::new(),
        }
    }
}

/// Resource requests written into the batch script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOptions {
    /// SLURM partition or LSF queue.
    pub queue: Option<String>,
    pub nodes: u32,
    /// Wall-clock limit, passed through verbatim (`--time` / `-W`).
    pub time_limit: Option<String>,
    /// Memory request, passed through verbatim (`--mem` / `-M`).
    pub memory: Option<String>,
    pub account: Option<String>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            queue: None,
            nodes: 1,
            time_limit: None,
            memory: None,
            account: None,
        }
    }
}

/// Serde-backed job configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJobConfig {
    pub jobid: String,
    pub working_directory: PathBuf,
    #[serde(default)]
    pub ansys_edt_path: Option<PathBuf>,
    pub project_path: PathBuf,
    #[serde(default)]
    pub scheduler_type: SchedulerType,
    #[serde(default)]
    pub solver: SolverOptions,
    #[serde(default)]
    pub batch: BatchOptions,
}

impl BatchJobConfig {
    pub fn new(
        jobid: impl Into<String>,
        working_directory: impl Into<PathBuf>,
        project_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            jobid: jobid.into(),
            working_directory: working_directory.into(),
            ansys_edt_path: None,
            project_path: project_path.into(),
            scheduler_type: SchedulerType::None,
            solver: SolverOptions::default(),
            batch: BatchOptions::default(),
        }
    }

    pub fn from_json(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Batch script for the configured scheduler.
    pub fn batch_script(&self) -> anyhow::Result<String> {
        let log = self.log_path();
        let log = log.display();
        let wd = self.working_directory.display();
        let exe = self
            .ansys_edt_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "ansysedt".to_string());

        let mut script = String::from("#!/bin/bash\n");
        match self.scheduler_type {
            SchedulerType::Slurm => {
                script.push_str(&format!("#SBATCH --job-name={}\n", self.jobid));
                script.push_str(&format!("#SBATCH --output={log}\n"));
                script.push_str(&format!("#SBATCH --error={log}\n"));
                script.push_str(&format!("#SBATCH --nodes={}\n", self.batch.nodes));
                script.push_str(&format!("#SBATCH --ntasks={}\n", self.solver.num_cores));
                if let Some(q) = &self.batch.queue {
                    script.push_str(&format!("#SBATCH --partition={q}\n"));
                }
                if let Some(t) = &self.batch.time_limit {
                    script.push_str(&format!("#SBATCH --time={t}\n"));
                }
                if let Some(m) = &self.batch.memory {
                    script.push_str(&format!("#SBATCH --mem={m}\n"));
                }
                if let Some(a) = &self.batch.account {
                    script.push_str(&format!("#SBATCH --account={a}\n"));
                }
            }
            SchedulerType::Lsf => {
                script.push_str(&format!("#BSUB -J {}\n", self.jobid));
                script.push_str(&format!("#BSUB -o {log}\n"));
                script.push_str(&format!("#BSUB -e {log}\n"));
                script.push_str(&format!("#BSUB -n {}\n", self.solver.num_cores));
                if let Some(q) = &self.batch.queue {
                    script.push_str(&format!("#BSUB -q {q}\n"));
                }
                if let Some(t) = &self.batch.time_limit {
                    script.push_str(&format!("#BSUB -W {t}\n"));
                }
                if let Some(m) = &self.batch.memory {
                    script.push_str(&format!("#BSUB -M {m}\n"));
                }
                if let Some(a) = &self.batch.account {
                    script.push_str(&format!("#BSUB -P {a}\n"));
                }
            }
            SchedulerType::None => bail!("job {} has no scheduler type", self.jobid),
        }

        script.push_str(&format!("\ncd {}\n", shell_quote(&wd.to_string())));
        let mut line = vec![shell_quote(&exe)];
        line.extend(self.generate_command_list().iter().map(|a| shell_quote(a)));
        script.push_str(&line.join(" "));
        script.push('\n');
        Ok(script)
    }

    fn script_path(&self) -> PathBuf {
        self.working_directory.join(format!("{}.sh", self.jobid))
    }
}

impl SimulationConfig for BatchJobConfig {
    fn job_id(&self) -> &str {
        &self.jobid
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    fn ansys_edt_path(&self) -> Option<&Path> {
        self.ansys_edt_path.as_deref()
    }

    fn project_path(&self) -> &Path {
        &self.project_path
    }

    fn scheduler_type(&self) -> SchedulerType {
        self.scheduler_type
    }

    fn generate_command_list(&self) -> Vec<String> {
        let mut args = vec!["-ng".to_string(), "-batchsolve".to_string()];
        if self.solver.distributed {
            args.push("-Distributed".to_string());
            args.push("-machinelist".to_string());
            args.push(format!("num={}", self.solver.num_cores));
        } else if self.solver.num_cores > 1 {
            args.push("-monitor".to_string());
            args.push("-cores".to_string());
            args.push(self.solver.num_cores.to_string());
        }
        if !self.solver.batch_options.is_empty() {
            let opts: Vec<String> = self
                .solver
                .batch_options
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            args.push("-batchoptions".to_string());
            args.push(opts.join(" "));
        }
        args.extend(self.solver.extra_args.iter().cloned());
        if let Some(design) = &self.solver.design_name {
            args.push(design.clone());
        }
        args.push(self.project_path.display().to_string());
        args
    }

    fn submit_to_scheduler(&self) -> BoxFuture<'_, anyhow::Result<String>> {
        Box::pin(async move {
            let script = self.batch_script()?;
            let path = self.script_path();
            tokio::fs::write(&path, &script)
                .await
                .with_context(|| format!("write batch script {}", path.display()))?;

            let output = match self.scheduler_type {
                SchedulerType::Slurm => {
                    Command::new("sbatch")
                        .arg(&path)
                        .current_dir(&self.working_directory)
                        .output()
                        .await
                        .context("spawn sbatch")?
                }
                SchedulerType::Lsf => {
                    // bsub only honours #BSUB directives when the script
                    // arrives on stdin.
                    let mut child = Command::new("bsub")
                        .current_dir(&self.working_directory)
                        .stdin(Stdio::piped())
                        .stdout(Stdio::piped())
                        .stderr(Stdio::piped())
                        .spawn()
                        .context("spawn bsub")?;
                    if let Some(mut stdin) = child.stdin.take() {
                        stdin.write_all(script.as_bytes()).await?;
                    }
                    child.wait_with_output().await?
                }
                SchedulerType::None => bail!("job {} has no scheduler type", self.jobid),
            };

            if !output.status.success() {
                bail!(
                    "{} submission failed ({}): {}",
                    self.scheduler_type,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        })
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
