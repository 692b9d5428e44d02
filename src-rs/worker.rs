use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::engine::lazy::panic_message;
use crate::engine::{EngineError, LazyEngine};
use crate::helpers::preview;
use crate::task::{BatchTask, SingleTask, TaskRecord, TaskRegistry, TaskStatus, TaskStore};

const BACKOFF_SLICE: Duration = Duration::from_millis(100);

/// The single consumer. Claims the oldest pending task, persists the claim,
/// then drives the engine outside the registry lock.
pub struct Worker {
    registry: Arc<TaskRegistry>,
    store: Arc<TaskStore>,
    engine: Arc<LazyEngine>,
    running: Arc<AtomicBool>,
    config: QueueConfig,
}

impl Worker {
    pub fn new(
        registry: Arc<TaskRegistry>,
        store: Arc<TaskStore>,
        engine: Arc<LazyEngine>,
        running: Arc<AtomicBool>,
        config: QueueConfig,
    ) -> Self {
        Self {
            registry,
            store,
            engine,
            running,
            config,
        }
    }

    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("tts-worker".to_string())
            .spawn(move || self.run())
    }

    pub fn run(&self) {
        info!(thread = ?thread::current().id(), "worker started");
        if self.config.eager_engine_init {
            match panic::catch_unwind(AssertUnwindSafe(|| self.engine.ensure())) {
                Ok(Ok(())) => info!("synthesis engine pre-initialized"),
                Ok(Err(err)) => warn!(error = %err, "engine pre-initialization failed, retrying on first task"),
                Err(payload) => warn!(
                    error = %panic_message(payload.as_ref()),
                    "engine pre-initialization panicked, retrying on first task"
                ),
            }
        }

        while self.running.load(Ordering::SeqCst) {
            match panic::catch_unwind(AssertUnwindSafe(|| self.step())) {
                Ok(true) => {}
                Ok(false) => self.registry.wait_for_work(self.config.poll_interval),
                Err(payload) => {
                    error!(error = %panic_message(payload.as_ref()), "worker iteration failed");
                    self.back_off(self.config.error_backoff);
                }
            }
        }
        info!("worker stopped");
    }

    /// One scheduling round. Returns `false` when nothing was pending.
    pub fn step(&self) -> bool {
        let task = match self.registry.claim_next(Utc::now()) {
            Some(task) => task,
            None => return false,
        };
        info!(task_id = %task.task_id(), kind = task.kind(), "claimed task");
        self.store.save(&self.registry);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match &task {
            TaskRecord::Single(single) => self.process_single(single),
            TaskRecord::Batch(batch) => self.process_batch(batch),
        }));
        if let Err(payload) = outcome {
            let message = format!("task processing panicked: {}", panic_message(payload.as_ref()));
            self.fail_claimed(task.task_id(), &message);
            panic::resume_unwind(payload);
        }
        true
    }

    /// Moves a claimed task that is still processing to FAILED so it never
    /// stays claimed after its iteration died.
    fn fail_claimed(&self, task_id: &str, message: &str) {
        let finished_at = Utc::now();
        let failed = self
            .registry
            .update(task_id, |record| match record {
                TaskRecord::Single(task) if task.status == TaskStatus::Processing => {
                    task.fail(message, finished_at).is_ok()
                }
                TaskRecord::Batch(task) if task.status == TaskStatus::Processing => {
                    task.abort(message, finished_at).is_ok()
                }
                _ => false,
            })
            .unwrap_or(false);
        if failed {
            error!(%task_id, error = %message, "claimed task failed");
            self.store.save(&self.registry);
        }
    }

    fn process_single(&self, task: &SingleTask) {
        debug!(
            task_id = %task.task_id,
            text = %preview(&task.text, 50),
            prompt = %task.prompt_path.display(),
            output = %task.output_path.display(),
            mode = %task.infer_mode,
            "synthesizing"
        );
        let outcome = ensure_parent(&task.output_path).and_then(|()| {
            self.engine
                .run(task.infer_mode, &task.text, &task.prompt_path, &task.output_path)
        });

        let finished_at = Utc::now();
        let applied = self
            .registry
            .update(&task.task_id, |record| {
                record.as_single_mut().map(|single| {
                    let transition = match &outcome {
                        Ok(()) => single.complete(finished_at),
                        Err(err) => single.fail(err.to_string(), finished_at),
                    };
                    transition.map(|()| single.process_time())
                })
            })
            .flatten();

        match (applied, &outcome) {
            (Some(Err(err)), _) => warn!(error = %err, "dropping task outcome"),
            (Some(Ok(process_time)), Ok(())) => {
                info!(task_id = %task.task_id, ?process_time, "task completed")
            }
            (Some(Ok(_)), Err(err)) => error!(task_id = %task.task_id, error = %err, "task failed"),
            (None, _) => warn!(task_id = %task.task_id, "task vanished from registry"),
        }
        self.store.save(&self.registry);
    }

    fn process_batch(&self, task: &BatchTask) {
        info!(
            task_id = %task.task_id,
            total = task.total_files,
            output = %task.output_directory.display(),
            mode = %task.infer_mode,
            "processing batch"
        );
        let finished = match self.run_batch(task) {
            Ok(()) => {
                let finished_at = Utc::now();
                self.registry
                    .update(&task.task_id, |record| record.as_batch_mut().map(|batch| batch.finish(finished_at)))
                    .flatten()
            }
            Err(err) => {
                error!(task_id = %task.task_id, error = %err, "batch aborted");
                let finished_at = Utc::now();
                self.registry
                    .update(&task.task_id, |record| {
                        record
                            .as_batch_mut()
                            .map(|batch| batch.abort(err.to_string(), finished_at).map(|()| batch.status))
                    })
                    .flatten()
            }
        };

        match finished {
            Some(Ok(status)) => info!(task_id = %task.task_id, %status, "batch finished"),
            Some(Err(err)) => warn!(error = %err, "dropping batch outcome"),
            None => warn!(task_id = %task.task_id, "task vanished from registry"),
        }
        self.store.save(&self.registry);
    }

    /// Synthesizes every item in order. Item failures are recorded and skipped;
    /// only errors outside the per-item calls abort the batch.
    fn run_batch(&self, task: &BatchTask) -> Result<(), EngineError> {
        fs::create_dir_all(&task.output_directory).map_err(|err| {
            EngineError::new(format!(
                "failed to create output directory {}: {}",
                task.output_directory.display(),
                err
            ))
        })?;
        self.engine.ensure()?;

        for (index, (filename, text)) in task.speeches.iter().enumerate() {
            let output = task.output_directory.join(filename);
            let outcome = self
                .engine
                .run(task.infer_mode, text, &task.prompt_path, &output);

            self.registry.update(&task.task_id, |record| {
                if let Some(batch) = record.as_batch_mut() {
                    match &outcome {
                        Ok(()) => batch.record_success(),
                        Err(err) => batch.record_failure(filename.as_str(), err.to_string()),
                    }
                }
            });
            match &outcome {
                Ok(()) => debug!(task_id = %task.task_id, %filename, item = index + 1, "batch item done"),
                Err(err) => warn!(task_id = %task.task_id, %filename, error = %err, "batch item failed"),
            }
            self.store.save(&self.registry);
        }
        Ok(())
    }

    fn back_off(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.running.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(BACKOFF_SLICE.min(deadline.saturating_duration_since(Instant::now())));
        }
    }
}

fn ensure_parent(output_path: &Path) -> Result<(), EngineError> {
    match output_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).map_err(|err| {
            EngineError::new(format!("failed to create output directory {}: {}", dir.display(), err))
        }),
        _ => Ok(()),
    }
}
