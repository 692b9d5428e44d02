#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tts_queue_rs::engine::{EngineError, EngineFactory, SynthesisEngine};
use tts_queue_rs::{QueueConfig, TaskManager, TaskRecord};

#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub text: String,
    pub prompt: PathBuf,
    pub output: PathBuf,
    pub fast: bool,
}

/// Blocks the engine on one text until opened.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
    }
}

#[derive(Clone, Default)]
pub struct Script {
    pub failures: HashMap<String, String>,
    pub held: Option<(String, Arc<Gate>)>,
    pub failed_builds: usize,
    pub panicking_builds: usize,
}

impl Script {
    pub fn failing(mut self, text: &str, message: &str) -> Self {
        self.failures.insert(text.to_string(), message.to_string());
        self
    }

    pub fn hold(mut self, text: &str, gate: Arc<Gate>) -> Self {
        self.held = Some((text.to_string(), gate));
        self
    }

    pub fn failed_builds(mut self, count: usize) -> Self {
        self.failed_builds = count;
        self
    }

    pub fn panicking_builds(mut self, count: usize) -> Self {
        self.panicking_builds = count;
        self
    }
}

pub struct ScriptedEngine {
    script: Script,
    calls: Arc<Mutex<Vec<Call>>>,
    broken: bool,
}

impl Drop for ScriptedEngine {
    fn drop(&mut self) {
        if self.broken && !thread::panicking() {
            panic!("engine teardown failed");
        }
    }
}

impl ScriptedEngine {
    fn call(&mut self, text: &str, prompt: &Path, output: &Path, fast: bool) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(Call {
            text: text.to_string(),
            prompt: prompt.to_path_buf(),
            output: output.to_path_buf(),
            fast,
        });
        if let Some((held, gate)) = &self.script.held {
            if held == text {
                gate.wait();
            }
        }
        if text == "panic" {
            panic!("engine crashed");
        }
        if text == "panic on teardown" {
            self.broken = true;
            panic!("engine crashed");
        }
        if let Some(message) = self.script.failures.get(text) {
            return Err(EngineError::new(message.clone()));
        }
        fs::write(output, b"RIFF").map_err(|err| EngineError::new(err.to_string()))
    }
}

impl SynthesisEngine for ScriptedEngine {
    fn synthesize(&mut self, text: &str, prompt_path: &Path, output_path: &Path) -> Result<(), EngineError> {
        self.call(text, prompt_path, output_path, false)
    }

    fn synthesize_fast(&mut self, text: &str, prompt_path: &Path, output_path: &Path) -> Result<(), EngineError> {
        self.call(text, prompt_path, output_path, true)
    }
}

pub struct Harness {
    pub factory: Arc<dyn EngineFactory>,
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub builds: Arc<AtomicUsize>,
}

pub fn harness(script: Script) -> Harness {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let builds = Arc::new(AtomicUsize::new(0));
    let factory = {
        let calls = calls.clone();
        let builds = builds.clone();
        move || -> Result<Box<dyn SynthesisEngine>, EngineError> {
            let attempt = builds.fetch_add(1, Ordering::SeqCst);
            if attempt < script.panicking_builds {
                panic!("checkpoint loader crashed");
            }
            if attempt < script.failed_builds {
                return Err(EngineError::new("model checkpoint missing"));
            }
            Ok(Box::new(ScriptedEngine {
                script: script.clone(),
                calls: calls.clone(),
                broken: false,
            }))
        }
    };
    let factory: Arc<dyn EngineFactory> = Arc::new(factory);
    Harness { factory, calls, builds }
}

pub fn test_config(tasks_file: Option<PathBuf>) -> QueueConfig {
    QueueConfig {
        tasks_file,
        poll_interval: Duration::from_millis(10),
        error_backoff: Duration::from_millis(50),
        shutdown_timeout: Duration::from_secs(5),
        eager_engine_init: false,
    }
}

pub fn wait_until<F>(manager: &TaskManager, task_id: &str, mut done: F) -> TaskRecord
where
    F: FnMut(&TaskRecord) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let record = manager.get_task(task_id).expect("task exists");
        if done(&record) {
            return record;
        }
        assert!(Instant::now() < deadline, "timed out waiting on {}: {:?}", task_id, record);
        thread::sleep(Duration::from_millis(5));
    }
}

pub fn wait_for_terminal(manager: &TaskManager, task_id: &str) -> TaskRecord {
    wait_until(manager, task_id, |record| record.status().is_terminal())
}
