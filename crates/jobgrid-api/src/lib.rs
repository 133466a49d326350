//! jobgrid-api — REST API for the jobgrid orchestrator.
//!
//! Thin axum layer over [`JobLifecycleManager`]. Every error is JSON with
//! a `success: false` flag and a human-readable `error`.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/resources` | Latest resource snapshot |
//! | GET | `/queue` | Queue statistics |
//! | GET | `/jobs` | Job summaries |
//! | POST | `/jobs/submit` | Submit `{config, priority}` |
//! | GET | `/jobs/{id}` | Job detail with captured output |
//! | POST | `/jobs/{id}/cancel` | Cancel a job |
//! | POST | `/jobs/{id}/priority` | Re-queue at `{priority}` |
//! | GET | `/pool/limits` | Current admission limits |
//! | PUT | `/pool/limits` | Partial limits update |
//! | GET | `/scheduler/partitions` | External scheduler partitions |
//! | GET | `/system/status` | Scheduler, queue and host overview |
//! | GET | `/metrics` | Prometheus exposition |

pub mod exposition;
pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use jobgrid_scheduler::JobLifecycleManager;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub manager: JobLifecycleManager,
}

/// Build the complete API router.
pub fn build_router(manager: JobLifecycleManager) -> Router {
    let state = ApiState { manager };

    Router::new()
        .route("/resources", get(handlers::get_resources))
        .route("/queue", get(handlers::get_queue))
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/submit", post(handlers::submit_job))
        .route("/jobs/{id}", get(handlers::get_job))
        .route("/jobs/{id}/cancel", post(handlers::cancel_job))
        .route("/jobs/{id}/priority", post(handlers::set_priority))
        .route("/pool/limits", get(handlers::get_limits).put(handlers::update_limits))
        .route("/scheduler/partitions", get(handlers::list_partitions))
        .route("/system/status", get(handlers::system_status))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
