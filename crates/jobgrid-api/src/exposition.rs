//! Prometheus text exposition for host resources, the queue and job
//! states.

use std::fmt::Write;

use jobgrid_core::{JobStatus, ResourceSnapshot};
use jobgrid_scheduler::QueueStats;

fn gauge(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    let _ = writeln!(out, "{name} {value}");
}

/// Render the orchestrator's gauges.
///
/// Job counts carry a `status` label and list every status, zeros included.
pub fn render_prometheus(
    snapshot: &ResourceSnapshot,
    queue: &QueueStats,
    counts: &[(JobStatus, usize)],
) -> String {
    let mut out = String::new();

    gauge(
        &mut out,
        "jobgrid_cpu_percent",
        "Host CPU utilisation (0-100).",
        format!("{:.2}", snapshot.cpu_percent),
    );
    gauge(
        &mut out,
        "jobgrid_memory_percent",
        "Host memory utilisation (0-100).",
        format!("{:.2}", snapshot.memory_percent),
    );
    gauge(
        &mut out,
        "jobgrid_memory_free_gb",
        "Available host memory in GB.",
        format!("{:.2}", snapshot.memory_free_gb),
    );
    gauge(
        &mut out,
        "jobgrid_disk_free_gb",
        "Free space on the watched volume in GB.",
        format!("{:.2}", snapshot.disk_free_gb),
    );
    gauge(
        &mut out,
        "jobgrid_jobs_queued",
        "Jobs waiting for admission.",
        queue.total_queued,
    );
    gauge(
        &mut out,
        "jobgrid_jobs_running",
        "Jobs holding a concurrency slot.",
        queue.running_count,
    );
    gauge(
        &mut out,
        "jobgrid_max_concurrent_jobs",
        "Configured concurrency cap.",
        queue.max_concurrent,
    );

    out.push_str("# HELP jobgrid_jobs Known jobs by status.\n");
    out.push_str("# TYPE jobgrid_jobs gauge\n");
    for status in JobStatus::ALL {
        let n = counts
            .iter()
            .find(|(s, _)| *s == status)
            .map_or(0, |(_, n)| *n);
        let _ = writeln!(out, "jobgrid_jobs{{status=\"{}\"}} {n}", status.as_str());
    }

    out
}
