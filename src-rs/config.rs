use std::path::PathBuf;
use std::time::Duration;

use crate::engine::{CommandEngineConfig, HttpEngineConfig};

#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// `None` keeps the registry in memory only.
    pub tasks_file: Option<PathBuf>,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub shutdown_timeout: Duration,
    pub eager_engine_init: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            tasks_file: Some(PathBuf::from("outputs/tts_queue_tasks.json")),
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            eager_engine_init: true,
        }
    }
}

#[derive(Clone, Debug)]
pub enum EngineConfig {
    Http(HttpEngineConfig),
    Command(CommandEngineConfig),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::Http(HttpEngineConfig::default())
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub prompts_dir: PathBuf,
    pub prompt_index_file: PathBuf,
    pub engine: EngineConfig,
    pub queue: QueueConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 51046,
            prompts_dir: PathBuf::from("prompts"),
            prompt_index_file: PathBuf::from("prompt_last_index.txt"),
            engine: EngineConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}
