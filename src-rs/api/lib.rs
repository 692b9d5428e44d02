pub use crate::manager::TaskManager;
pub use crate::prompts::PromptPool;
pub use crate::result::{TaskReceipt, TaskView};
pub use crate::task::{InferMode, TaskRecord, TaskStatus};

pub mod handlers;
pub mod server;

pub use server::{build_router, AppState, QueueServer};
