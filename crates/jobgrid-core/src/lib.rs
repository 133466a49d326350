//! jobgrid-core — shared types for the jobgrid orchestrator.
//!
//! Holds everything the other crates agree on: the job state machine,
//! job records and their public summaries, admission limits, telemetry
//! snapshots, lifecycle events, the simulation configuration contract,
//! and the daemon's TOML configuration.
//!
//! # Job lifecycle
//!
//! ```text
//! QUEUED ──► RUNNING ──► COMPLETED | FAILED | CANCELLED
//!    │
//!    ├─────► SCHEDULED ──► RUNNING ──► COMPLETED | FAILED
//!    │            └──────► COMPLETED | FAILED | CANCELLED
//!    └─────► CANCELLED | FAILED
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod limits;
pub mod simulation;
pub mod types;

pub use config::DaemonConfig;
pub use error::{TransitionError, ValidationError, ValidationResult};
pub use events::JobEvent;
pub use limits::{LimitsUpdate, ResourceLimits};
pub use simulation::{BatchJobConfig, BoxFuture, SimulationConfig};
pub use types::*;
