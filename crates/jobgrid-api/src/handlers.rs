//! REST API handlers.
//!
//! Each handler calls into the job manager and returns JSON. Reads use the
//! `{success, data}` envelope; submit and cancel answer with the flat
//! `{success, job_id}` / `{success}` shapes clients poll for.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use jobgrid_bridge::PartitionInfo;
use jobgrid_core::{BatchJobConfig, LimitsUpdate, ResourceSnapshot, SchedulerType};
use jobgrid_scheduler::{JobError, QueueStats};

use crate::ApiState;
use crate::exposition::render_prometheus;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn job_error_response(e: &JobError) -> Response {
    let status = match e {
        JobError::Validation(_) | JobError::Duplicate(_) | JobError::NoScheduler => {
            StatusCode::BAD_REQUEST
        }
        JobError::NotFound(_) => StatusCode::NOT_FOUND,
        JobError::InvalidState { .. } => StatusCode::CONFLICT,
        JobError::Scheduler(_) => StatusCode::BAD_GATEWAY,
    };
    error_response(&e.to_string(), status)
}

fn body_or_400(body: Result<Json<Value>, JsonRejection>) -> Result<Value, Response> {
    body.map(|Json(v)| v)
        .map_err(|e| error_response(&e.body_text(), StatusCode::BAD_REQUEST))
}

// ── Host and queue ─────────────────────────────────────────────

/// GET /resources
pub async fn get_resources(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.manager.telemetry()).into_response()
}

/// GET /queue
pub async fn get_queue(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.manager.queue_stats().await).into_response()
}

// ── Jobs ───────────────────────────────────────────────────────

/// GET /jobs
pub async fn list_jobs(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.manager.jobs().await).into_response()
}

/// GET /jobs/{id}
pub async fn get_job(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.manager.job(&id).await {
        Some(detail) => ApiResponse::ok(detail).into_response(),
        None => error_response("job not found", StatusCode::NOT_FOUND),
    }
}

/// Parse `{config, priority}`. Priority defaults to 0.
fn parse_submit(body: &Value) -> Result<(BatchJobConfig, i32), String> {
    let obj = body.as_object().ok_or("expected a JSON object")?;
    let config = obj.get("config").ok_or("missing field `config`")?;
    let config =
        BatchJobConfig::from_json(config.clone()).map_err(|e| format!("invalid config: {e}"))?;
    let priority = match obj.get("priority") {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_i64()
            .and_then(|p| i32::try_from(p).ok())
            .ok_or("priority must be an integer")?,
    };
    Ok((config, priority))
}

/// POST /jobs/submit
pub async fn submit_job(
    State(state): State<ApiState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match body_or_400(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let (config, priority) = match parse_submit(&body) {
        Ok(parsed) => parsed,
        Err(msg) => return error_response(&msg, StatusCode::BAD_REQUEST),
    };

    match state.manager.submit(Arc::new(config), priority).await {
        Ok(job_id) => Json(json!({ "success": true, "job_id": job_id })).into_response(),
        Err(e) => {
            debug!(error = %e, "submission rejected");
            job_error_response(&e)
        }
    }
}

/// POST /jobs/{id}/cancel
pub async fn cancel_job(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    if state.manager.job(&id).await.is_none() {
        return error_response("job not found", StatusCode::NOT_FOUND);
    }
    match state.manager.cancel(&id).await {
        Ok(cancelled) => Json(json!({ "success": cancelled })).into_response(),
        Err(e) => {
            warn!(job_id = %id, error = %e, "cancel failed");
            job_error_response(&e)
        }
    }
}

/// POST /jobs/{id}/priority
pub async fn set_priority(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match body_or_400(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(priority) = body
        .get("priority")
        .and_then(Value::as_i64)
        .and_then(|p| i32::try_from(p).ok())
    else {
        return error_response("priority must be an integer", StatusCode::BAD_REQUEST);
    };

    match state.manager.set_priority(&id, priority).await {
        Ok(()) => ApiResponse::ok(json!({ "job_id": id, "priority": priority })).into_response(),
        Err(e) => job_error_response(&e),
    }
}

// ── Limits ─────────────────────────────────────────────────────

/// GET /pool/limits
pub async fn get_limits(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.manager.limits().await).into_response()
}

/// PUT /pool/limits
pub async fn update_limits(
    State(state): State<ApiState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match body_or_400(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let update = match LimitsUpdate::from_json(&body) {
        Ok(u) => u,
        Err(e) => return error_response(&e.to_string(), StatusCode::BAD_REQUEST),
    };
    match state.manager.edit_limits(&update).await {
        Ok(limits) => ApiResponse::ok(limits).into_response(),
        Err(e) => job_error_response(&e),
    }
}

// ── External scheduler ─────────────────────────────────────────

/// GET /scheduler/partitions
pub async fn list_partitions(State(state): State<ApiState>) -> Response {
    let Some(bridge) = state.manager.bridge() else {
        return job_error_response(&JobError::NoScheduler);
    };
    match bridge.list_partitions().await {
        Ok(partitions) => ApiResponse::ok(partitions).into_response(),
        Err(e) => job_error_response(&JobError::Scheduler(e)),
    }
}

/// Composite view served by `/system/status`.
#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub scheduler: SchedulerType,
    pub partitions: Vec<PartitionInfo>,
    pub external_jobs: usize,
    pub queue: QueueStats,
    pub resources: ResourceSnapshot,
    pub jobs: BTreeMap<&'static str, usize>,
}

/// GET /system/status
pub async fn system_status(State(state): State<ApiState>) -> Response {
    let Some(bridge) = state.manager.bridge() else {
        return job_error_response(&JobError::NoScheduler);
    };
    let partitions = match bridge.list_partitions().await {
        Ok(p) => p,
        Err(e) => return job_error_response(&JobError::Scheduler(e)),
    };
    let external_jobs = match bridge.list_jobs().await {
        Ok(jobs) => jobs.len(),
        Err(e) => return job_error_response(&JobError::Scheduler(e)),
    };

    let status = SystemStatus {
        scheduler: bridge.kind(),
        partitions,
        external_jobs,
        queue: state.manager.queue_stats().await,
        resources: state.manager.telemetry(),
        jobs: state
            .manager
            .status_counts()
            .await
            .into_iter()
            .map(|(s, n)| (s.as_str(), n))
            .collect(),
    };
    ApiResponse::ok(status).into_response()
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> Response {
    let snapshot = state.manager.telemetry();
    let queue = state.manager.queue_stats().await;
    let counts = state.manager.status_counts().await;

    let body = render_prometheus(&snapshot, &queue, &counts);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}
