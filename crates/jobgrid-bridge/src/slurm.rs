//! SLURM command lines and output parsers.

use std::collections::BTreeMap;

use regex::Regex;

use crate::bridge::{ExternalJob, PartitionInfo};
use crate::error::{BridgeError, BridgeResult};
use crate::state::ExternalJobState;
use crate::units::{MemUnit, parse_memory_gb};

pub const SQUEUE: &str = "squeue";
pub const SINFO: &str = "sinfo";
pub const SCANCEL: &str = "scancel";

/// job id | partition | user | state | nodes | cpus | min memory
pub fn squeue_args() -> Vec<String> {
    vec![
        "--noheader".to_string(),
        "--all".to_string(),
        "--format=%i|%P|%u|%T|%D|%C|%m".to_string(),
    ]
}

/// partition | nodes A/I/O/T | cpus A/I/O/T | memory per node (MB)
pub fn sinfo_args() -> Vec<String> {
    vec!["--noheader".to_string(), "--format=%R|%F|%C|%m".to_string()]
}

pub fn scancel_args(job_id: &str) -> Vec<String> {
    vec![job_id.to_string()]
}

/// `scancel` on a job that has already ended, with exit 0 or not.
pub fn is_already_finished(text: &str) -> bool {
    text.contains("already completing or completed")
}

/// Extract the job id from `sbatch` output.
pub fn parse_submission(stdout: &str) -> Option<String> {
    let re = Regex::new(r"Submitted batch job (\d+)").ok()?;
    re.captures(stdout).map(|c| c[1].to_string())
}

pub fn parse_squeue(output: &str) -> BridgeResult<Vec<ExternalJob>> {
    let mut jobs = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() < 7 {
            return Err(BridgeError::Parse {
                what: "squeue line",
                detail: line.to_string(),
            });
        }
        jobs.push(ExternalJob {
            job_id: fields[0].to_string(),
            partition: fields[1].to_string(),
            user: fields[2].to_string(),
            state: ExternalJobState::from_slurm(fields[3]),
            nodes: fields[4].parse().unwrap_or(0),
            cpus: fields[5].parse().unwrap_or(0),
            memory_gb: parse_memory_gb(fields[6], MemUnit::Mb).unwrap_or(0.0),
        });
    }
    Ok(jobs)
}

/// Parse `sinfo` output. A partition whose nodes differ in memory spans
/// several lines; those are summed into one record.
pub fn parse_sinfo(output: &str) -> BridgeResult<Vec<PartitionInfo>> {
    let mut by_name: BTreeMap<String, PartitionInfo> = BTreeMap::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() < 4 {
            return Err(BridgeError::Parse {
                what: "sinfo line",
                detail: line.to_string(),
            });
        }
        let name = fields[0].trim_end_matches('*').to_string();
        let (nodes_used, nodes_total) = parse_aiot(fields[1]).ok_or_else(|| BridgeError::Parse {
            what: "sinfo node counts",
            detail: fields[1].to_string(),
        })?;
        let (cores_used, cores_total) = parse_aiot(fields[2]).ok_or_else(|| BridgeError::Parse {
            what: "sinfo cpu counts",
            detail: fields[2].to_string(),
        })?;
        let mem_per_node = parse_memory_gb(fields[3], MemUnit::Mb).unwrap_or(0.0);

        let entry = by_name.entry(name.clone()).or_insert_with(|| PartitionInfo {
            name,
            ..Default::default()
        });
        entry.nodes_total += nodes_total;
        entry.nodes_used += nodes_used;
        entry.cores_total += cores_total;
        entry.cores_used += cores_used;
        entry.memory_total_gb += mem_per_node * nodes_total as f64;
        entry.memory_used_gb += mem_per_node * nodes_used as f64;
    }

    Ok(by_name.into_values().collect())
}

/// `allocated/idle/other/total` → (allocated, total).
fn parse_aiot(s: &str) -> Option<(u32, u32)> {
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() != 4 {
        return None;
    }
    let allocated = parts[0].parse().ok()?;
    let total = parts[3].parse().ok()?;
    Some((allocated, total))
}
