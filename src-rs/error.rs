use std::path::PathBuf;

use thiserror::Error;

use crate::task::TaskStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode tasks: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to replace {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("task {task_id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub task_id: String,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AbandonError {
    #[error("task {0} was not interrupted by a restart")]
    NotInterrupted(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown engine kind: {0}")]
    UnknownEngine(String),

    #[error("{key} is required when TTS_ENGINE={engine}")]
    MissingSetting { key: String, engine: String },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
