use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, info, warn};

use super::types::{EngineError, EngineFactory, SynthesisEngine};
use crate::task::InferMode;

/// Owns the engine handle and builds it on first use. A failed build leaves the
/// slot empty so the next call tries again.
pub struct LazyEngine {
    factory: Arc<dyn EngineFactory>,
    engine: Mutex<Option<Box<dyn SynthesisEngine>>>,
    ready: AtomicBool,
}

impl LazyEngine {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            engine: Mutex::new(None),
            ready: AtomicBool::new(false),
        }
    }

    /// Does not wait on an in-flight synthesis call.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn ensure(&self) -> Result<(), EngineError> {
        let mut slot = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        self.live(&mut slot).map(|_| ())
    }

    /// Runs one synthesis call, picking the fast path for `BatchFast`. A panic
    /// inside the engine is reported as an error and the engine is rebuilt on
    /// the next call.
    pub fn run(&self, mode: InferMode, text: &str, prompt_path: &Path, output_path: &Path) -> Result<(), EngineError> {
        let mut slot = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        let engine = self.live(&mut slot)?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match mode {
            InferMode::Normal => engine.synthesize(text, prompt_path, output_path),
            InferMode::BatchFast => engine.synthesize_fast(text, prompt_path, output_path),
        }));
        match outcome {
            Ok(result) => result,
            Err(payload) => {
                let message = format!("synthesis engine panicked: {}", panic_message(payload.as_ref()));
                warn!(%message, "discarding engine");
                self.ready.store(false, Ordering::SeqCst);
                *slot = None;
                Err(EngineError::new(message))
            }
        }
    }

    fn live<'a>(
        &self,
        slot: &'a mut Option<Box<dyn SynthesisEngine>>,
    ) -> Result<&'a mut Box<dyn SynthesisEngine>, EngineError> {
        if slot.is_none() {
            info!("initializing synthesis engine");
            let built = panic::catch_unwind(AssertUnwindSafe(|| self.factory.create())).unwrap_or_else(|payload| {
                Err(EngineError::new(format!(
                    "synthesis engine initialization panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
            match built {
                Ok(engine) => {
                    info!("synthesis engine initialized");
                    *slot = Some(engine);
                    self.ready.store(true, Ordering::SeqCst);
                }
                Err(err) => {
                    error!(error = %err, "failed to initialize synthesis engine");
                    return Err(err);
                }
            }
        }
        slot.as_mut()
            .ok_or_else(|| EngineError::new("synthesis engine unavailable"))
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
