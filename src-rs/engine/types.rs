use std::path::Path;

use thiserror::Error;

/// Failure reported by a synthesis engine. Displays as the bare message, which
/// is what ends up in a task's `error` field.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A blocking, stateful text-to-speech backend. Calls are never made
/// concurrently; the worker thread is the only caller.
pub trait SynthesisEngine: Send {
    fn synthesize(&mut self, text: &str, prompt_path: &Path, output_path: &Path) -> Result<(), EngineError>;

    fn synthesize_fast(&mut self, text: &str, prompt_path: &Path, output_path: &Path) -> Result<(), EngineError>;
}

pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn SynthesisEngine>, EngineError>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Result<Box<dyn SynthesisEngine>, EngineError> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn SynthesisEngine>, EngineError> {
        self()
    }
}
