//! jobgrid-bridge — talks to an external batch scheduler.
//!
//! Wraps the SLURM (`squeue`, `sinfo`, `scancel`) and LSF (`bjobs`,
//! `bqueues`, `bkill`) command lines and normalises their output into
//! uniform [`ExternalJob`] and [`PartitionInfo`] records. All parsing of
//! scheduler text happens here; callers only see [`ExternalJobState`].
//!
//! # Architecture
//!
//! ```text
//! SchedulerBridge
//!   ├── CommandRunner (tokio::process, or scripted output in tests)
//!   ├── slurm::{parse_squeue, parse_sinfo, parse_submission}
//!   └── lsf::{parse_bjobs, parse_bqueues, parse_submission}
//! ```
//!
//! A non-zero exit from any scheduler command surfaces as
//! [`BridgeError::Command`]. The bridge never retries.

pub mod bridge;
pub mod error;
pub mod lsf;
pub mod runner;
pub mod slurm;
pub mod state;
pub mod units;

pub use bridge::{ExternalJob, PartitionInfo, SchedulerBridge, parse_submission_id};
pub use error::{BridgeError, BridgeResult};
pub use runner::{CommandOutput, CommandRunner, ScriptedRunner, SystemCommandRunner};
pub use state::ExternalJobState;
