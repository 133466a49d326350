//! Resource sampler: background task that refreshes the host snapshot.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;
use sysinfo::{Disk, Disks, System};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use jobgrid_core::{ResourceSnapshot, epoch_secs};

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Read side of the telemetry channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TelemetryHandle {
    rx: watch::Receiver<ResourceSnapshot>,
}

impl TelemetryHandle {
    /// A channel whose sender is driven by the caller instead of a sampler.
    pub fn channel(initial: ResourceSnapshot) -> (watch::Sender<ResourceSnapshot>, Self) {
        let (tx, rx) = watch::channel(initial);
        (tx, Self { rx })
    }

    /// A handle that always reports `snapshot`.
    pub fn fixed(snapshot: ResourceSnapshot) -> Self {
        Self::channel(snapshot).1
    }

    /// Latest completed sample.
    pub fn current(&self) -> ResourceSnapshot {
        self.rx.borrow().clone()
    }

    /// False during the degraded-start window before the first sample.
    pub fn has_sample(&self) -> bool {
        self.rx.borrow().timestamp != 0
    }
}

/// Samples host CPU, memory and disk usage.
pub struct ResourceTelemetry {
    system: System,
    disks: Disks,
    /// Path whose volume is reported as the primary disk.
    volume: PathBuf,
    tx: watch::Sender<ResourceSnapshot>,
}

impl ResourceTelemetry {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ResourceSnapshot::default());
        let volume = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self {
            system: System::new(),
            disks: Disks::new_with_refreshed_list(),
            volume,
            tx,
        }
    }

    /// Report the volume holding `path` instead of the current directory's.
    pub fn with_volume(mut self, path: impl Into<PathBuf>) -> Self {
        self.volume = path.into();
        self
    }

    pub fn handle(&self) -> TelemetryHandle {
        TelemetryHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// Replace the published snapshot.
    pub fn publish(&self, snapshot: ResourceSnapshot) {
        self.tx.send_replace(snapshot);
    }

    /// Take one reading and publish it.
    ///
    /// CPU usage needs two refreshes spaced by sysinfo's minimum update
    /// interval, so this suspends for that long.
    pub async fn sample(&mut self) -> anyhow::Result<ResourceSnapshot> {
        self.system.refresh_cpu_usage();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.disks.refresh_list();

        let memory = MemoryReading {
            total: self.system.total_memory(),
            used: self.system.used_memory(),
            available: self.system.available_memory(),
        };
        if memory.total == 0 {
            return Err(anyhow!("memory totals unavailable"));
        }

        let disk = primary_disk(self.disks.list(), &self.volume)
            .ok_or_else(|| anyhow!("no disk found for {}", self.volume.display()))?;
        let disk = DiskReading {
            total: disk.total_space(),
            available: disk.available_space(),
        };

        let snapshot = build_snapshot(
            self.system.global_cpu_usage() as f64,
            memory,
            disk,
            epoch_secs(),
        );
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    /// Sample every `interval` until shutdown. The first sample is taken
    /// immediately. A failed sample keeps the previous snapshot.
    pub async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "resource telemetry started");

        self.sample_logged().await;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.sample_logged().await;
                }
                _ = shutdown.changed() => {
                    info!("resource telemetry shutting down");
                    break;
                }
            }
        }
    }

    async fn sample_logged(&mut self) {
        match self.sample().await {
            Ok(s) => debug!(
                cpu = s.cpu_percent,
                memory_free_gb = s.memory_free_gb,
                disk_free_gb = s.disk_free_gb,
                "resource sample"
            ),
            Err(e) => warn!(error = %e, "resource sample failed, keeping previous snapshot"),
        }
    }
}

impl Default for ResourceTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// Memory figures in bytes.
#[derive(Debug, Clone, Copy)]
struct MemoryReading {
    total: u64,
    used: u64,
    available: u64,
}

/// Disk figures in bytes.
#[derive(Debug, Clone, Copy)]
struct DiskReading {
    total: u64,
    available: u64,
}

fn build_snapshot(
    cpu_percent: f64,
    memory: MemoryReading,
    disk: DiskReading,
    timestamp: u64,
) -> ResourceSnapshot {
    let memory_percent = if memory.total > 0 {
        memory.used as f64 / memory.total as f64 * 100.0
    } else {
        0.0
    };
    let disk_usage_percent = if disk.total > 0 {
        (disk.total - disk.available.min(disk.total)) as f64 / disk.total as f64 * 100.0
    } else {
        0.0
    };

    ResourceSnapshot {
        cpu_percent,
        memory_percent,
        memory_used_gb: memory.used as f64 / GB,
        memory_total_gb: memory.total as f64 / GB,
        memory_free_gb: memory.available as f64 / GB,
        disk_usage_percent,
        disk_free_gb: disk.available as f64 / GB,
        timestamp,
    }
}

/// The disk with the longest mount point containing `path`.
fn primary_disk<'a>(disks: &'a [Disk], path: &Path) -> Option<&'a Disk> {
    let mounts: Vec<&Path> = disks.iter().map(|d| d.mount_point()).collect();
    let idx = longest_mount(&mounts, path)?;
    disks.get(idx)
}

fn longest_mount(mounts: &[&Path], path: &Path) -> Option<usize> {
    mounts
        .iter()
        .enumerate()
        .filter(|(_, m)| path.starts_with(m))
        .max_by_key(|(_, m)| m.as_os_str().len())
        .map(|(i, _)| i)
        .or(if mounts.is_empty() { None } else { Some(0) })
}
