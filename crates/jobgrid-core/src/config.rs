//! jobgrid.toml daemon configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::limits::ResourceLimits;
use crate::types::SchedulerType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub limits: ResourceLimits,
    pub scheduler: SchedulerConfig,
    pub execution: ExecutionConfig,
    pub intervals: IntervalsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub kind: SchedulerType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Used when a job's own executable path is missing.
    pub default_executable: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalsConfig {
    pub telemetry_secs: u64,
    pub monitor_secs: u64,
    pub dispatch_idle_ms: u64,
    pub dispatch_backoff_ms: u64,
    pub cancel_grace_secs: u64,
}

impl Default for IntervalsConfig {
    fn default() -> Self {
        Self {
            telemetry_secs: 5,
            monitor_secs: 5,
            dispatch_idle_ms: 1000,
            dispatch_backoff_ms: 5000,
            cancel_grace_secs: 5,
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.limits.validate()?;
        if config.intervals.telemetry_secs == 0 || config.intervals.monitor_secs == 0 {
            anyhow::bail!("telemetry_secs and monitor_secs must be at least 1");
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
