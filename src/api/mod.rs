//! HTTP front door — task submission, status polling, cancellation.
//!
//! Submission answers immediately with `queued`; it never waits for
//! processing. Status reads come from the status store only — this surface
//! never talks to the queue beyond publishing the request message.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::queue::MessageSink;
use crate::store::StatusStore;
use crate::task::{TaskMessage, TaskStatus};

/// Shared state for the task routes.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn StatusStore>,
    pub sink: Arc<dyn MessageSink>,
    /// Topic new task messages are published to.
    pub request_topic: String,
}

/// Build the task API router.
pub fn task_routes(state: ApiState) -> Router {
    Router::new()
        .route("/api/tasks", post(create_task))
        .route("/api/tasks/{task_id}", get(task_status))
        .route("/api/tasks/{task_id}/cancel", post(cancel_task))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateTaskRequest {
    user_id: String,
    content: String,
    agent_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct TaskStatusResponse {
    task_id: String,
    status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// `POST /api/tasks` — enqueue a new task and answer without waiting.
async fn create_task(
    State(state): State<ApiState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let task_id = Uuid::new_v4().to_string();

    state
        .store
        .set_status(&task_id, TaskStatus::Queued)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to write queued status");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "task submission failed")
        })?;

    let message = TaskMessage {
        task_id: task_id.clone(),
        user_id: req.user_id,
        payload: req.content,
        agent_type: req
            .agent_type
            .unwrap_or_else(|| crate::agent::DEFAULT_AGENT_TYPE.to_string()),
    };
    let body = serde_json::to_string(&message).map_err(|e| {
        error!(error = %e, "Failed to serialize task message");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "task submission failed")
    })?;

    if let Err(e) = state.sink.send(&state.request_topic, body, &task_id).await {
        error!(%task_id, error = %e, "Failed to publish task message");
        // Roll back the status key so the id does not linger as a phantom task.
        let _ = state.store.clear(&task_id).await;
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "task submission failed",
        ));
    }

    info!(%task_id, "Task queued");
    Ok(Json(TaskStatusResponse {
        task_id,
        status: TaskStatus::Queued,
        result: None,
    }))
}

/// `GET /api/tasks/{task_id}` — status (and result, once terminal) from the
/// store only.
async fn task_status(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let status = state
        .store
        .status(&task_id)
        .await
        .map_err(|e| {
            error!(%task_id, error = %e, "Status read failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "status read failed")
        })?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "unknown task"))?;

    let result = if status.is_terminal() {
        state.store.result(&task_id).await.unwrap_or_default()
    } else {
        None
    };

    Ok(Json(TaskStatusResponse {
        task_id,
        status,
        result,
    }))
}

/// `POST /api/tasks/{task_id}/cancel` — revoke a task before it is claimed.
async fn cancel_task(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let status = state
        .store
        .status(&task_id)
        .await
        .map_err(|e| {
            error!(%task_id, error = %e, "Status read failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "status read failed")
        })?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "unknown task"))?;

    if !status.can_transition_to(TaskStatus::Canceled) {
        return Err(api_error(
            StatusCode::CONFLICT,
            format!("cannot cancel a {status} task"),
        ));
    }

    state
        .store
        .set_status(&task_id, TaskStatus::Canceled)
        .await
        .map_err(|e| {
            error!(%task_id, error = %e, "Cancel write failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "cancel failed")
        })?;

    info!(%task_id, "Task canceled");
    Ok(Json(TaskStatusResponse {
        task_id,
        status: TaskStatus::Canceled,
        result: None,
    }))
}
