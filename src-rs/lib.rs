pub mod config;
pub mod error;
pub mod helpers;
pub mod manager;
pub mod prompts;
pub mod result;
pub mod worker;

#[path = "engine/lib.rs"]
pub mod engine;
#[path = "task/lib.rs"]
pub mod task;
#[path = "api/lib.rs"]
pub mod api;

pub use config::{QueueConfig, ServerConfig};
pub use manager::TaskManager;
pub use result::{TaskReceipt, TaskView};
pub use task::{TaskRecord, TaskStatus};
