use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use indexmap::IndexMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::engine::{EngineFactory, LazyEngine};
use crate::error::AbandonError;
use crate::helpers::preview;
use crate::task::{
    BatchTask, InferMode, SingleTask, StatusCounts, TaskRecord, TaskRegistry, TaskStatus, TaskStore,
};
use crate::worker::Worker;

const JOIN_POLL: Duration = Duration::from_millis(20);

/// Error recorded on a task that was mid-synthesis when the process stopped
/// and has been abandoned by an operator.
pub const INTERRUPTED_ERROR: &str = "interrupted before completion";

/// Owns the registry, its durable mirror, the engine and the worker thread.
/// Producers only ever create and read tasks; the worker does all mutation.
pub struct TaskManager {
    config: QueueConfig,
    registry: Arc<TaskRegistry>,
    store: Arc<TaskStore>,
    engine: Arc<LazyEngine>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    interrupted: Vec<String>,
}

impl TaskManager {
    pub fn new(config: QueueConfig, factory: Arc<dyn EngineFactory>) -> io::Result<Self> {
        info!("initializing task manager");
        let store = match &config.tasks_file {
            Some(path) => TaskStore::new(path),
            None => TaskStore::in_memory(),
        };
        let registry = Arc::new(TaskRegistry::from_tasks(store.load()));
        info!(tasks_file = ?store.path(), tasks = registry.len(), "restored task registry");

        // A task still processing was cut off by the last shutdown. It is never
        // requeued automatically; an operator decides via `abandon_interrupted`.
        let interrupted = registry.ids_with_status(TaskStatus::Processing);
        for task_id in &interrupted {
            warn!(%task_id, "task was processing when the previous run stopped and will not be resumed");
        }

        let store = Arc::new(store);
        let engine = Arc::new(LazyEngine::new(factory));
        let running = Arc::new(AtomicBool::new(true));

        let handle = Worker::new(
            registry.clone(),
            store.clone(),
            engine.clone(),
            running.clone(),
            config.clone(),
        )
        .spawn()?;
        info!("task manager initialized, worker thread started");

        Ok(Self {
            config,
            registry,
            store,
            engine,
            running,
            worker: Mutex::new(Some(handle)),
            interrupted,
        })
    }

    pub fn create_task(
        &self,
        text: &str,
        prompt_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        infer_mode: InferMode,
    ) -> String {
        let task_id = next_id();
        let task = SingleTask::new(task_id.clone(), text, prompt_path, output_path, infer_mode);
        self.registry.put(TaskRecord::Single(task));
        self.store.save(&self.registry);
        info!(%task_id, text = %preview(text, 30), "created task");
        task_id
    }

    pub fn create_batch_task(
        &self,
        speeches: IndexMap<String, String>,
        prompt_path: impl Into<PathBuf>,
        output_directory: impl Into<PathBuf>,
        infer_mode: InferMode,
    ) -> String {
        let task_id = next_id();
        let task = BatchTask::new(task_id.clone(), speeches, prompt_path, output_directory, infer_mode);
        let total = task.total_files;
        self.registry.put(TaskRecord::Batch(task));
        self.store.save(&self.registry);
        info!(%task_id, total, "created batch task");
        task_id
    }

    pub fn get_task(&self, task_id: &str) -> Option<TaskRecord> {
        let task = self.registry.get(task_id);
        match &task {
            Some(record) => debug!(%task_id, status = %record.status(), "retrieved task"),
            None => debug!(%task_id, "task not found"),
        }
        task
    }

    /// Most recent first.
    pub fn list_tasks(&self, limit: usize) -> Vec<TaskRecord> {
        self.registry.list(limit)
    }

    pub fn status_counts(&self) -> StatusCounts {
        self.registry.counts()
    }

    pub fn engine_ready(&self) -> bool {
        self.engine.is_ready()
    }

    /// Tasks found processing at startup that are still stuck in that state.
    pub fn interrupted_tasks(&self) -> Vec<String> {
        self.interrupted
            .iter()
            .filter(|task_id| {
                self.registry
                    .get(task_id)
                    .map(|record| record.status() == TaskStatus::Processing)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Marks an interrupted task failed so callers stop waiting on it.
    pub fn abandon_interrupted(&self, task_id: &str) -> Result<TaskRecord, AbandonError> {
        if !self.interrupted.iter().any(|id| id == task_id) {
            return Err(AbandonError::NotInterrupted(task_id.to_string()));
        }
        let at = Utc::now();
        let record = self
            .registry
            .update(task_id, |record: &mut TaskRecord| -> Result<TaskRecord, AbandonError> {
                match record {
                    TaskRecord::Single(task) => task.fail(INTERRUPTED_ERROR, at)?,
                    TaskRecord::Batch(task) => task.abort(INTERRUPTED_ERROR, at)?,
                }
                Ok(record.clone())
            })
            .ok_or_else(|| AbandonError::NotInterrupted(task_id.to_string()))??;
        self.store.save(&self.registry);
        warn!(%task_id, "interrupted task abandoned");
        Ok(record)
    }

    /// Stops the worker after its current task, waits up to the configured
    /// timeout, and writes a final snapshot. Safe to call more than once.
    pub fn shutdown(&self) {
        let handle = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        let handle = match handle {
            Some(handle) => handle,
            None => return,
        };
        info!("shutting down task manager");
        self.running.store(false, Ordering::SeqCst);
        self.registry.notify();

        let deadline = Instant::now() + self.config.shutdown_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(JOIN_POLL);
        }
        if handle.is_finished() {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        } else {
            warn!(
                timeout_secs = self.config.shutdown_timeout.as_secs_f64(),
                "worker still busy, leaving the in-flight task to finish"
            );
        }

        self.store.save(&self.registry);
        info!("task manager shutdown complete");
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn next_id() -> String {
    format!("task_{}", Uuid::now_v7().simple())
}
