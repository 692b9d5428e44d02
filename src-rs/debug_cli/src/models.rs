use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct CLIConfig {
    pub base_url: String,
    pub output_dir: String,
    pub infer_mode: String,
    /// Prompt file name inside the server's pool; `None` lets the server rotate.
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateTaskRequest {
    pub text: String,
    pub output_path: String,
    pub prompt_path: Option<String>,
    pub infer_mode: String,
}

#[derive(Debug, Serialize)]
pub struct CreateBatchTaskRequest {
    pub speeches: IndexMap<String, String>,
    pub output_directory: String,
    pub prompt_path: Option<String>,
    pub infer_mode: String,
}

#[derive(Debug, Deserialize)]
pub struct TaskReceipt {
    pub task_id: String,
    pub status: String,
    pub total_files: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ItemError {
    pub filename: String,
    pub error: String,
}

/// Either task shape; batch-only fields are absent for single tasks.
#[derive(Clone, Debug, Deserialize)]
pub struct TaskInfo {
    pub task_id: String,
    pub status: String,
    pub output_path: Option<String>,
    pub output_directory: Option<String>,
    pub process_time: Option<f64>,
    pub error: Option<String>,
    pub total_files: Option<usize>,
    pub processed_files: Option<usize>,
    #[serde(default)]
    pub errors: Vec<ItemError>,
}

impl TaskInfo {
    pub fn is_finished(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "failed")
    }
}
