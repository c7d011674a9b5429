//! HTTP control-plane handlers.
//!
//! A thin JSON adapter over the supervisor: handlers own no state and do
//! no validation beyond field presence — semantic validation lives in the
//! core operations. Bodies are read as raw bytes and decoded here so a
//! malformed or incomplete payload maps to 400 with a message naming the
//! problem, and non-2xx responses always carry `{"error": msg}`.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::error;

use taskfleet_common::{FleetError, TaskResult};

use crate::supervisor::Supervisor;

/// Error shape returned to HTTP callers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        match err {
            FleetError::Validation(_) | FleetError::QueueFull(_) => Self {
                status: StatusCode::BAD_REQUEST,
                message: err.to_string(),
            },
            FleetError::NotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                message: err.to_string(),
            },
            other => {
                // Never leak internals to the caller.
                error!(error = %other, "internal error handling control-plane request");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Internal server error".to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))
}

/// Result payload posted to `/tasks/:id/result`; the task id comes from
/// the path.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportResultRequest {
    worker_id: String,
    success: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    duration_ms: u64,
}

/// Build the control-plane router over a supervisor.
pub fn router(supervisor: Arc<Supervisor>) -> Router {
    Router::new()
        .route("/workers/register", post(register_worker))
        .route("/workers/heartbeat", post(heartbeat))
        .route("/workers/:id", delete(unregister_worker))
        .route("/workers", get(list_workers))
        .route("/tasks", post(submit_task))
        .route("/tasks/:id", get(get_task))
        .route("/tasks/:id/result", post(report_task_result))
        .route("/status", get(status))
        .route("/health", get(health))
        .with_state(supervisor)
}

async fn register_worker(
    State(supervisor): State<Arc<Supervisor>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let registration = parse_json(&body)?;
    let worker = supervisor.register_worker(registration).await?;
    Ok(Json(json!({ "success": true, "worker": worker })))
}

async fn heartbeat(
    State(supervisor): State<Arc<Supervisor>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let hb = parse_json(&body)?;
    let worker = supervisor.heartbeat(hb).await?;
    Ok(Json(json!({ "success": true, "worker": worker })))
}

async fn unregister_worker(
    State(supervisor): State<Arc<Supervisor>>,
    Path(id): Path<String>,
) -> Json<Value> {
    let existed = supervisor.unregister_worker(&id).await;
    Json(json!({ "success": existed }))
}

async fn list_workers(State(supervisor): State<Arc<Supervisor>>) -> Json<Value> {
    let workers = supervisor.list_workers().await;
    Json(json!({ "workers": workers }))
}

async fn submit_task(
    State(supervisor): State<Arc<Supervisor>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let submission = parse_json(&body)?;
    let task = supervisor.submit_task(submission).await?;
    Ok(Json(json!({ "success": true, "task": task })))
}

async fn get_task(
    State(supervisor): State<Arc<Supervisor>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task = supervisor.get_task(&id).await;
    let result = supervisor.get_task_result(&id).await;
    if task.is_none() && result.is_none() {
        return Err(ApiError::not_found(format!("task {}", id)));
    }

    let mut response = Map::new();
    if let Some(task) = task {
        response.insert("task".to_string(), serde_json::to_value(task)?);
    }
    if let Some(result) = result {
        response.insert("result".to_string(), serde_json::to_value(result)?);
    }
    Ok(Json(Value::Object(response)))
}

async fn report_task_result(
    State(supervisor): State<Arc<Supervisor>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: ReportResultRequest = parse_json(&body)?;
    supervisor
        .report_task_result(TaskResult {
            task_id: id,
            worker_id: req.worker_id,
            success: req.success,
            result: req.result,
            error: req.error,
            duration_ms: req.duration_ms,
        })
        .await?;
    Ok(Json(json!({ "success": true })))
}

async fn status(State(supervisor): State<Arc<Supervisor>>) -> Result<Json<Value>, ApiError> {
    let stats = supervisor.stats().await;
    Ok(Json(serde_json::to_value(stats)?))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        FleetError::from(err).into()
    }
}
