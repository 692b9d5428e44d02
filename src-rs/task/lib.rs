pub mod registry;
pub mod store;
pub mod types;

pub use registry::{TaskMap, TaskRegistry};
pub use store::TaskStore;
pub use types::{
    BatchItemError, BatchTask, InferMode, SingleTask, StatusCounts, TaskRecord, TaskStatus, BATCH_PROCESS_ERROR,
};
