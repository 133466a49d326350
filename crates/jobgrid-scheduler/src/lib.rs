//! jobgrid-scheduler — priority job pool, dispatch and lifecycle management.
//!
//! The [`JobLifecycleManager`] owns every job record and is the only
//! component that changes a job's status. It runs two loops:
//!
//! - **dispatch**: admits queued jobs through the [`JobPool`] admission
//!   predicate and spawns one supervised execution task per job
//! - **monitor**: polls the external scheduler for SCHEDULED jobs and
//!   advances them until they are terminal
//!
//! # Architecture
//!
//! ```text
//! JobLifecycleManager
//!   ├── Registry (tokio Mutex)
//!   │     ├── JobRecord per job id
//!   │     └── JobPool (priority buckets, FIFO, running set, limits)
//!   ├── TelemetryHandle (latest ResourceSnapshot)
//!   ├── SchedulerBridge (optional, SLURM or LSF)
//!   └── Notifier (tracing, broadcast, composite)
//!
//! dispatch loop ──► execution task ──► local subprocess
//!                                 └──► scheduler submission ──► monitor loop
//! ```
//!
//! Per-job failures never escape an execution task: they end up as a
//! FAILED record with an error string, announced as `job_completed`.

pub mod error;
mod execution;
pub mod manager;
mod monitor;
pub mod notifier;
pub mod pool;

pub use error::{ExecutionError, JobError, JobResult};
pub use manager::{JobLifecycleManager, LOCAL_JOB_TIMEOUT, ManagerBuilder, ManagerConfig};
pub use notifier::{BroadcastNotifier, CompositeNotifier, Notifier, RecordingNotifier, TracingNotifier};
pub use pool::{JobPool, QueueStats};
