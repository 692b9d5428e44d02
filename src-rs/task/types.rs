use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Filename recorded in a batch's `errors` when the batch fails as a whole.
pub const BATCH_PROCESS_ERROR: &str = "batch_process";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Statuses only move forward: pending, processing, then one terminal state.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InferMode {
    #[default]
    #[serde(rename = "normal", alias = "普通推理")]
    Normal,
    #[serde(rename = "batch-fast", alias = "批次推理")]
    BatchFast,
}

impl InferMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::BatchFast => "batch-fast",
        }
    }
}

impl fmt::Display for InferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemError {
    pub filename: String,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SingleTask {
    pub task_id: String,
    pub text: String,
    pub prompt_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(default)]
    pub infer_mode: InferMode,
    pub status: TaskStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SingleTask {
    pub fn new(
        task_id: impl Into<String>,
        text: impl Into<String>,
        prompt_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        infer_mode: InferMode,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            text: text.into(),
            prompt_path: prompt_path.into(),
            output_path: output_path.into(),
            infer_mode,
            status: TaskStatus::Pending,
            start_time: None,
            end_time: None,
            error: None,
        }
    }

    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        advance(
            &self.task_id,
            &mut self.status,
            &mut self.start_time,
            &mut self.end_time,
            TaskStatus::Completed,
            at,
        )
    }

    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> Result<(), TransitionError> {
        advance(
            &self.task_id,
            &mut self.status,
            &mut self.start_time,
            &mut self.end_time,
            TaskStatus::Failed,
            at,
        )?;
        self.error = Some(error.into());
        Ok(())
    }

    pub fn process_time(&self) -> Option<f64> {
        elapsed_seconds(self.start_time, self.end_time)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchTask {
    pub task_id: String,
    /// Output filename to text, synthesized in insertion order.
    pub speeches: IndexMap<String, String>,
    pub prompt_path: PathBuf,
    pub output_directory: PathBuf,
    #[serde(default)]
    pub infer_mode: InferMode,
    pub status: TaskStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_files: usize,
    pub processed_files: usize,
    #[serde(default)]
    pub errors: Vec<BatchItemError>,
}

impl BatchTask {
    pub fn new(
        task_id: impl Into<String>,
        speeches: IndexMap<String, String>,
        prompt_path: impl Into<PathBuf>,
        output_directory: impl Into<PathBuf>,
        infer_mode: InferMode,
    ) -> Self {
        let total_files = speeches.len();
        Self {
            task_id: task_id.into(),
            speeches,
            prompt_path: prompt_path.into(),
            output_directory: output_directory.into(),
            infer_mode,
            status: TaskStatus::Pending,
            start_time: None,
            end_time: None,
            total_files,
            processed_files: 0,
            errors: Vec::new(),
        }
    }

    pub fn record_success(&mut self) {
        if self.processed_files < self.total_files {
            self.processed_files += 1;
        }
    }

    pub fn record_failure(&mut self, filename: impl Into<String>, error: impl Into<String>) {
        self.errors.push(BatchItemError {
            filename: filename.into(),
            error: error.into(),
        });
    }

    /// Terminal status once every item has been attempted. Partial success still
    /// completes; the batch only fails when nothing was synthesized.
    pub fn outcome(&self) -> TaskStatus {
        if self.processed_files == self.total_files || self.processed_files > 0 {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        }
    }

    pub fn finish(&mut self, at: DateTime<Utc>) -> Result<TaskStatus, TransitionError> {
        let outcome = self.outcome();
        advance(
            &self.task_id,
            &mut self.status,
            &mut self.start_time,
            &mut self.end_time,
            outcome,
            at,
        )?;
        Ok(outcome)
    }

    /// Fails the whole batch after an error outside the per-item loop.
    pub fn abort(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> Result<(), TransitionError> {
        advance(
            &self.task_id,
            &mut self.status,
            &mut self.start_time,
            &mut self.end_time,
            TaskStatus::Failed,
            at,
        )?;
        self.record_failure(BATCH_PROCESS_ERROR, error);
        Ok(())
    }

    pub fn process_time(&self) -> Option<f64> {
        elapsed_seconds(self.start_time, self.end_time)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "lowercase")]
pub enum TaskRecord {
    Single(SingleTask),
    Batch(BatchTask),
}

impl TaskRecord {
    pub fn task_id(&self) -> &str {
        match self {
            Self::Single(task) => &task.task_id,
            Self::Batch(task) => &task.task_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Single(_) => "single",
            Self::Batch(_) => "batch",
        }
    }

    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Single(task) => task.status,
            Self::Batch(task) => task.status,
        }
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Single(task) => task.start_time,
            Self::Batch(task) => task.start_time,
        }
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Single(task) => task.end_time,
            Self::Batch(task) => task.end_time,
        }
    }

    pub fn process_time(&self) -> Option<f64> {
        elapsed_seconds(self.start_time(), self.end_time())
    }

    /// Hands the task to the worker: pending to processing, stamping `start_time`.
    pub fn claim(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        let (task_id, status, start, end) = match self {
            Self::Single(task) => (&task.task_id, &mut task.status, &mut task.start_time, &mut task.end_time),
            Self::Batch(task) => (&task.task_id, &mut task.status, &mut task.start_time, &mut task.end_time),
        };
        advance(task_id, status, start, end, TaskStatus::Processing, at)
    }

    pub fn as_single_mut(&mut self) -> Option<&mut SingleTask> {
        match self {
            Self::Single(task) => Some(task),
            Self::Batch(_) => None,
        }
    }

    pub fn as_batch_mut(&mut self) -> Option<&mut BatchTask> {
        match self {
            Self::Batch(task) => Some(task),
            Self::Single(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Processing => self.processing += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }
}

fn advance(
    task_id: &str,
    status: &mut TaskStatus,
    start_time: &mut Option<DateTime<Utc>>,
    end_time: &mut Option<DateTime<Utc>>,
    next: TaskStatus,
    at: DateTime<Utc>,
) -> Result<(), TransitionError> {
    if !status.can_transition_to(next) {
        return Err(TransitionError {
            task_id: task_id.to_string(),
            from: *status,
            to: next,
        });
    }
    *status = next;
    if next == TaskStatus::Processing {
        start_time.get_or_insert(at);
    } else if next.is_terminal() {
        end_time.get_or_insert(at);
    }
    Ok(())
}

/// Seconds between the two stamps, rounded to two decimals.
fn elapsed_seconds(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<f64> {
    let millis = (end? - start?).num_milliseconds().max(0);
    Some((millis as f64 / 10.0).round() / 100.0)
}
