pub mod command_engine;
pub mod http_engine;
pub mod lazy;
pub mod types;

pub use command_engine::{CommandEngine, CommandEngineConfig};
pub use http_engine::{HttpEngine, HttpEngineConfig};
pub use lazy::LazyEngine;
pub use types::{EngineError, EngineFactory, SynthesisEngine};
