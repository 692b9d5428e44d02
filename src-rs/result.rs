use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::task::{BatchItemError, TaskRecord, TaskStatus};

/// Returned to a producer right after a task is queued.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskReceipt {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_files: Option<usize>,
}

/// Public shape of a task as reported to pollers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskView {
    Single(SingleTaskView),
    Batch(BatchTaskView),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SingleTaskView {
    pub task_id: String,
    pub status: TaskStatus,
    pub output_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchTaskView {
    pub task_id: String,
    pub status: TaskStatus,
    pub output_directory: PathBuf,
    pub total_files: usize,
    pub processed_files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_time: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BatchItemError>,
}

impl From<&TaskRecord> for TaskView {
    fn from(record: &TaskRecord) -> Self {
        match record {
            TaskRecord::Single(task) => TaskView::Single(SingleTaskView {
                task_id: task.task_id.clone(),
                status: task.status,
                output_path: task.output_path.clone(),
                process_time: task.process_time(),
                error: if task.status == TaskStatus::Failed {
                    task.error.clone()
                } else {
                    None
                },
            }),
            TaskRecord::Batch(task) => TaskView::Batch(BatchTaskView {
                task_id: task.task_id.clone(),
                status: task.status,
                output_directory: task.output_directory.clone(),
                total_files: task.total_files,
                processed_files: task.processed_files,
                process_time: task.process_time(),
                errors: task.errors.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{BatchTask, InferMode, SingleTask};
    use indexmap::IndexMap;

    #[test]
    fn test_pending_single_view_omits_optional_fields() {
        let record = TaskRecord::Single(SingleTask::new("t1", "hi", "p.wav", "out/t1.wav", InferMode::Normal));
        let value = serde_json::to_value(TaskView::from(&record)).unwrap();
        assert_eq!(value["status"], "pending");
        assert_eq!(value["output_path"], "out/t1.wav");
        assert!(value.get("process_time").is_none());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_batch_view_reports_progress() {
        let mut speeches = IndexMap::new();
        speeches.insert("a.wav".to_string(), "one".to_string());
        speeches.insert("b.wav".to_string(), "two".to_string());
        let mut batch = BatchTask::new("b1", speeches, "p.wav", "out", InferMode::Normal);
        batch.record_success();
        let value = serde_json::to_value(TaskView::from(&TaskRecord::Batch(batch))).unwrap();
        assert_eq!(value["total_files"], 2);
        assert_eq!(value["processed_files"], 1);
        assert!(value.get("errors").is_none());
    }

    #[test]
    fn test_receipt_skips_total_for_single() {
        let receipt = TaskReceipt {
            task_id: "t1".to_string(),
            status: TaskStatus::Pending,
            total_files: None,
        };
        assert_eq!(serde_json::to_string(&receipt).unwrap(), r#"{"task_id":"t1","status":"pending"}"#);
    }
}
