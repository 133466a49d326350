//! LSF command lines and output parsers.

use regex::Regex;

use crate::bridge::{ExternalJob, PartitionInfo};
use crate::error::{BridgeError, BridgeResult};
use crate::state::ExternalJobState;
use crate::units::{MemUnit, parse_memory_gb};

pub const BJOBS: &str = "bjobs";
pub const BQUEUES: &str = "bqueues";
pub const BKILL: &str = "bkill";

pub fn bjobs_args() -> Vec<String> {
    vec![
        "-u".to_string(),
        "all".to_string(),
        "-noheader".to_string(),
        "-o".to_string(),
        "jobid queue user stat nexec_host slots mem delimiter='|'".to_string(),
    ]
}

pub fn bqueues_args() -> Vec<String> {
    vec![
        "-noheader".to_string(),
        "-o".to_string(),
        "queue_name max njobs run delimiter='|'".to_string(),
    ]
}

pub fn bkill_args(job_id: &str) -> Vec<String> {
    vec![job_id.to_string()]
}

/// `bkill` on a job that has already ended.
pub fn is_already_finished(text: &str) -> bool {
    text.contains("Job has already finished")
}

/// Extract the job id from `bsub` output.
pub fn parse_submission(stdout: &str) -> Option<String> {
    let re = Regex::new(r"Job <(\d+)> is submitted").ok()?;
    re.captures(stdout).map(|c| c[1].to_string())
}

/// `bjobs` reports an empty listing as a message, often with a non-zero
/// exit status.
pub fn is_empty_listing(text: &str) -> bool {
    text.contains("No unfinished job found") || text.contains("No job found")
}

pub fn parse_bjobs(output: &str) -> BridgeResult<Vec<ExternalJob>> {
    if is_empty_listing(output) {
        return Ok(Vec::new());
    }

    let mut jobs = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() < 7 {
            return Err(BridgeError::Parse {
                what: "bjobs line",
                detail: line.to_string(),
            });
        }
        jobs.push(ExternalJob {
            job_id: fields[0].to_string(),
            partition: fields[1].to_string(),
            user: fields[2].to_string(),
            state: ExternalJobState::from_lsf(fields[3]),
            nodes: count_or_zero(fields[4]),
            cpus: count_or_zero(fields[5]),
            // LSF reports unitless figures in KB unless LSF_UNIT_FOR_LIMITS says otherwise.
            memory_gb: parse_memory_gb(fields[6], MemUnit::Kb).unwrap_or(0.0),
        });
    }
    Ok(jobs)
}

/// Parse `bqueues` output. LSF has no node or memory totals per queue,
/// so those stay zero; `max` slots stand in for total cores.
pub fn parse_bqueues(output: &str) -> BridgeResult<Vec<PartitionInfo>> {
    let mut queues = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() < 4 || fields[0].is_empty() {
            return Err(BridgeError::Parse {
                what: "bqueues line",
                detail: line.to_string(),
            });
        }
        queues.push(PartitionInfo {
            name: fields[0].to_string(),
            cores_total: count_or_zero(fields[1]),
            cores_used: count_or_zero(fields[3]),
            ..Default::default()
        });
    }
    Ok(queues)
}

fn count_or_zero(s: &str) -> u32 {
    s.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_id() {
        assert_eq!(
            parse_submission("Job <4242> is submitted to queue <normal>.\n"),
            Some("4242".into())
        );
        assert_eq!(parse_submission("Request aborted by esub."), None);
    }

    #[test]
    fn bjobs_rows() {
        let out = "\
301|normal|alice|RUN|2|16|2 Gbytes
302|short|bob|PEND|-|4|-
";
        let jobs = parse_bjobs(out).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].state, ExternalJobState::Running);
        assert_eq!(jobs[0].nodes, 2);
        assert_eq!(jobs[0].cpus, 16);
        assert_eq!(jobs[0].memory_gb, 2.0);
        assert_eq!(jobs[1].state, ExternalJobState::Pending);
        assert_eq!(jobs[1].nodes, 0);
        assert_eq!(jobs[1].memory_gb, 0.0);
    }

    #[test]
    fn bjobs_no_jobs_message() {
        assert!(parse_bjobs("No unfinished job found\n").unwrap().is_empty());
        assert!(parse_bjobs("").unwrap().is_empty());
    }

    #[test]
    fn bjobs_malformed() {
        assert!(parse_bjobs("301|normal").is_err());
    }

    #[test]
    fn bqueues_rows() {
        let out = "\
normal|256|40|32
night|-|0|0
";
        let queues = parse_bqueues(out).unwrap();
        assert_eq!(queues.len(), 2);
        assert_eq!(queues[0].name, "normal");
        assert_eq!(queues[0].cores_total, 256);
        assert_eq!(queues[0].cores_used, 32);
        assert_eq!(queues[0].nodes_total, 0);
        assert_eq!(queues[1].cores_total, 0);
    }
}
