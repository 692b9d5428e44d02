use std::io::{self, Write};

use crate::models::{CLIConfig, TaskInfo, TaskReceipt};

pub fn banner(cfg: &CLIConfig) {
    println!("TTS Queue Debug CLI");
    println!("API: {}", cfg.base_url);
    println!("Output: {}  Mode: {}", cfg.output_dir, cfg.infer_mode);
    println!("Type /help for commands.");
}

pub fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

pub fn help() {
    println!("Commands:");
    println!("  /help                  Show commands");
    println!("  /exit | /quit          Exit");
    println!("  /say <text>            Queue a single task (bare text works too)");
    println!("  /batch <json file>     Queue a batch from {{\"name.wav\": \"text\"}}");
    println!("  /status <id>           Show one task");
    println!("  /wait <id>             Poll a task until it finishes");
    println!("  /tasks [limit]         List recent tasks");
    println!("  /prompts               List prompt audio on the server");
    println!("  /prompt [name|auto]    Pin a prompt or go back to rotation");
    println!("  /mode <normal|fast>    Set inference mode");
    println!("  /output <dir>          Set output directory");
    println!("  /config                Show current config");
    println!("  /base <url>            Update base URL");
}

pub fn receipt(receipt: &TaskReceipt) {
    match receipt.total_files {
        Some(total) => println!("queued {} [{}] ({} files)", receipt.task_id, receipt.status, total),
        None => println!("queued {} [{}]", receipt.task_id, receipt.status),
    }
}

pub fn task(task: &TaskInfo) {
    println!("[{}] {}", task.status, task.task_id);
    if let Some(path) = &task.output_path {
        println!("  output: {}", path);
    }
    if let Some(dir) = &task.output_directory {
        println!("  directory: {}", dir);
    }
    if let (Some(done), Some(total)) = (task.processed_files, task.total_files) {
        println!("  progress: {}/{}", done, total);
    }
    if let Some(secs) = task.process_time {
        println!("  time: {:.2}s", secs);
    }
    if let Some(err) = &task.error {
        println!("  error: {}", err);
    }
    for item in &task.errors {
        println!("  failed {}: {}", item.filename, item.error);
    }
}

pub fn tasks(tasks: &[TaskInfo]) {
    if tasks.is_empty() {
        println!("no tasks");
        return;
    }
    for task in tasks {
        match (task.processed_files, task.total_files) {
            (Some(done), Some(total)) => println!("[{}] {} batch {}/{}", task.status, task.task_id, done, total),
            _ => println!(
                "[{}] {} {}",
                task.status,
                task.task_id,
                task.output_path.clone().unwrap_or_default()
            ),
        }
    }
}

pub fn prompts(names: &[String], pinned: Option<&str>) {
    if names.is_empty() {
        println!("no prompts");
        return;
    }
    for name in names {
        let marker = if Some(name.as_str()) == pinned { "*" } else { " " };
        println!("{} {}", marker, name);
    }
}

pub fn config(cfg: &CLIConfig) {
    println!("config:");
    println!("  base: {}", cfg.base_url);
    println!("  output: {}", cfg.output_dir);
    println!("  mode: {}", cfg.infer_mode);
    println!("  prompt: {}", cfg.prompt.as_deref().unwrap_or("auto"));
}

pub fn info(msg: &str) {
    println!("{}", msg);
}

pub fn error(msg: &str) {
    eprintln!("error: {}", msg);
}
