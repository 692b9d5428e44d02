use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Local;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use crate::api::server::AppState;
use crate::prompts::{is_audio_file, is_plain_file_name};
use crate::result::{TaskReceipt, TaskView};
use crate::task::{InferMode, TaskStatus};

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub text: String,
    /// Directory the generated file is written into.
    pub output_path: String,
    pub prompt_path: Option<String>,
    #[serde(default)]
    pub infer_mode: InferMode,
}

#[derive(Debug, Deserialize)]
pub struct CreateBatchTaskRequest {
    pub speeches: IndexMap<String, String>,
    pub output_directory: String,
    pub prompt_path: Option<String>,
    #[serde(default)]
    pub infer_mode: InferMode,
}

#[derive(Debug, Deserialize, Default)]
pub struct TasksQuery {
    pub limit: Option<usize>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "engine_ready": state.manager.engine_ready(),
        "tasks": state.manager.status_counts(),
        "interrupted": state.manager.interrupted_tasks(),
    }))
}

pub async fn handle_prompts(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "prompts": state.prompts.list() }))
}

pub async fn handle_list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TasksQuery>,
) -> Json<serde_json::Value> {
    let limit = query.limit.unwrap_or(10);
    let tasks: Vec<TaskView> = state.manager.list_tasks(limit).iter().map(TaskView::from).collect();
    Json(json!({ "tasks": tasks }))
}

pub async fn handle_get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
    state
        .manager
        .get_task(&task_id)
        .map(|record| Json(TaskView::from(&record)))
        .ok_or_else(|| ApiError::not_found(format!("Task with ID '{}' not found", task_id)))
}

pub async fn handle_create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<TaskReceipt>, ApiError> {
    if req.text.trim().is_empty() {
        return Err(ApiError::bad_request("text required"));
    }
    if req.output_path.trim().is_empty() {
        return Err(ApiError::bad_request("output_path required"));
    }

    let receipt = tokio::task::spawn_blocking(move || {
        let prompt = state
            .prompts
            .select(req.prompt_path.as_deref())
            .ok_or_else(|| ApiError::bad_request("No prompt audio files found in the prompts directory"))?;
        let output = std::path::Path::new(&req.output_path).join(output_file_name());
        let task_id = state.manager.create_task(&req.text, prompt, output, req.infer_mode);
        Ok::<_, ApiError>(TaskReceipt {
            task_id,
            status: TaskStatus::Pending,
            total_files: None,
        })
    })
    .await
    .map_err(|err| {
        error!(error = %err, "task creation aborted");
        ApiError::internal(err.to_string())
    })??;

    Ok(Json(receipt))
}

pub async fn handle_create_batch_task(
    State(state): State<AppState>,
    Json(req): Json<CreateBatchTaskRequest>,
) -> Result<Json<TaskReceipt>, ApiError> {
    if req.speeches.is_empty() {
        return Err(ApiError::bad_request("speeches must not be empty"));
    }
    if req.output_directory.trim().is_empty() {
        return Err(ApiError::bad_request("output_directory required"));
    }
    let invalid: Vec<&str> = req
        .speeches
        .keys()
        .filter(|name| !is_plain_file_name(name) || !is_audio_file(name))
        .map(String::as_str)
        .collect();
    if !invalid.is_empty() {
        warn!(invalid = ?invalid, "rejecting batch with invalid filenames");
        return Err(ApiError::bad_request(format!(
            "All filenames must be plain names ending with .wav or .mp3. Invalid filenames: {}",
            invalid.join(", ")
        )));
    }

    let receipt = tokio::task::spawn_blocking(move || {
        let prompt = state
            .prompts
            .select(req.prompt_path.as_deref())
            .ok_or_else(|| ApiError::bad_request("No prompt audio files found in the prompts directory"))?;
        let total_files = req.speeches.len();
        let task_id = state
            .manager
            .create_batch_task(req.speeches, prompt, req.output_directory, req.infer_mode);
        Ok::<_, ApiError>(TaskReceipt {
            task_id,
            status: TaskStatus::Pending,
            total_files: Some(total_files),
        })
    })
    .await
    .map_err(|err| {
        error!(error = %err, "batch creation aborted");
        ApiError::internal(err.to_string())
    })??;

    Ok(Json(receipt))
}

/// Timestamped name with a random suffix so two requests in the same second
/// never share an output file.
fn output_file_name() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}.wav", Local::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}
