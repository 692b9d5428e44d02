use std::fs;
use std::process;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tts_queue_rs::api::server::QueueServer;
use tts_queue_rs::helpers::{build_engine_factory, load_server_config};
use tts_queue_rs::prompts::PromptPool;
use tts_queue_rs::TaskManager;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match load_server_config() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            process::exit(2);
        }
    };
    if let Err(err) = fs::create_dir_all(&config.prompts_dir) {
        warn!(dir = %config.prompts_dir.display(), error = %err, "failed to create prompts directory");
    }

    // Built before the async runtime exists: engines may hold blocking clients.
    let factory = build_engine_factory(&config.engine);
    let manager = match TaskManager::new(config.queue.clone(), factory) {
        Ok(manager) => Arc::new(manager),
        Err(err) => {
            error!(error = %err, "failed to start task manager");
            process::exit(1);
        }
    };
    let prompts = Arc::new(PromptPool::new(&config.prompts_dir, &config.prompt_index_file));
    let server = QueueServer::new(config.port, manager.clone(), prompts);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to start async runtime");
            manager.shutdown();
            process::exit(1);
        }
    };
    if let Err(err) = runtime.block_on(server.start(shutdown_signal())) {
        error!(error = %err, "server error");
    }
    drop(server);
    drop(runtime);

    manager.shutdown();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
