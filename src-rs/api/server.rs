use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::api::handlers::{
    handle_create_batch_task, handle_create_task, handle_get_task, handle_health, handle_list_tasks, handle_prompts,
};
use crate::manager::TaskManager;
use crate::prompts::PromptPool;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<TaskManager>,
    pub prompts: Arc<PromptPool>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/tts/health", get(handle_health))
        .route("/api/tts/prompts", get(handle_prompts))
        .route("/api/tts/tasks", get(handle_list_tasks).post(handle_create_task))
        .route("/api/tts/tasks/:task_id", get(handle_get_task))
        .route("/api/tts/batch_tasks", post(handle_create_batch_task))
        .with_state(state)
}

pub struct QueueServer {
    pub port: u16,
    pub state: AppState,
}

impl QueueServer {
    pub fn new(port: u16, manager: Arc<TaskManager>, prompts: Arc<PromptPool>) -> Self {
        Self {
            port,
            state: AppState { manager, prompts },
        }
    }

    pub async fn start<F>(&self, shutdown: F) -> Result<(), String>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = build_router(self.state.clone());
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!(%addr, "tts-queue listening");
        axum::Server::bind(&addr)
            .serve(app.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| err.to_string())
    }
}
