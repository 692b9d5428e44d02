use std::io;
use std::thread;
use std::time::{Duration, Instant};

use crate::cli::parse_mode;
use crate::client::{load_speeches, HTTPClient};
use crate::models::{CLIConfig, CreateBatchTaskRequest, CreateTaskRequest};
use crate::render;

const WAIT_INTERVAL: Duration = Duration::from_secs(1);
const WAIT_LIMIT: Duration = Duration::from_secs(600);

pub struct REPL {
    pub config: CLIConfig,
    pub client: HTTPClient,
    /// Most recently queued task, used when `/status` or `/wait` get no id.
    pub last_task: Option<String>,
}

impl REPL {
    pub fn new(config: CLIConfig, client: HTTPClient) -> Self {
        Self {
            config,
            client,
            last_task: None,
        }
    }

    pub fn run(&mut self) {
        render::banner(&self.config);
        loop {
            render::prompt();
            let mut line = String::new();
            match io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('/') {
                if self.handle_command(&line) {
                    break;
                }
                continue;
            }
            self.say(&line);
        }
    }

    fn handle_command(&mut self, line: &str) -> bool {
        let mut parts = line.splitn(2, ' ');
        let cmd = parts.next().unwrap_or("").trim_start_matches('/');
        let rest = parts.next().unwrap_or("").trim();
        match cmd {
            "exit" | "quit" => return true,
            "help" => render::help(),
            "say" => {
                if rest.is_empty() {
                    render::error("usage: /say <text>");
                } else {
                    self.say(rest);
                }
            }
            "batch" => {
                if rest.is_empty() {
                    render::error("usage: /batch <json file>");
                } else {
                    self.batch(rest);
                }
            }
            "status" => {
                if let Some(task_id) = self.task_arg(rest) {
                    match self.client.get_task(&task_id) {
                        Ok(task) => render::task(&task),
                        Err(err) => render::error(&err),
                    }
                }
            }
            "wait" => {
                if let Some(task_id) = self.task_arg(rest) {
                    self.wait(&task_id);
                }
            }
            "tasks" => {
                let limit = rest.parse::<usize>().unwrap_or(10);
                match self.client.list_tasks(limit) {
                    Ok(tasks) => render::tasks(&tasks),
                    Err(err) => render::error(&err),
                }
            }
            "prompts" => match self.client.list_prompts() {
                Ok(names) => render::prompts(&names, self.config.prompt.as_deref()),
                Err(err) => render::error(&err),
            },
            "prompt" => {
                if rest.is_empty() || rest == "auto" {
                    self.config.prompt = None;
                    render::info("prompt: auto");
                } else {
                    self.config.prompt = Some(rest.to_string());
                    render::info(&format!("prompt: {}", rest));
                }
            }
            "mode" => match parse_mode(rest) {
                Some(mode) => {
                    self.config.infer_mode = mode.to_string();
                    render::info(&format!("mode: {}", mode));
                }
                None if rest.is_empty() => render::info(&format!("mode: {}", self.config.infer_mode)),
                None => render::error("mode must be normal or batch-fast"),
            },
            "output" => {
                if rest.is_empty() {
                    render::info(&format!("output: {}", self.config.output_dir));
                } else {
                    self.config.output_dir = rest.to_string();
                    render::info("output directory updated");
                }
            }
            "config" => render::config(&self.config),
            "base" => {
                if rest.is_empty() {
                    render::info(&format!("base: {}", self.config.base_url));
                } else {
                    self.config.base_url = rest.to_string();
                    self.client = HTTPClient::new(&self.config.base_url);
                    render::info("base url updated");
                }
            }
            _ => render::info("unknown command, type /help"),
        }
        false
    }

    fn say(&mut self, text: &str) {
        let req = CreateTaskRequest {
            text: text.to_string(),
            output_path: self.config.output_dir.clone(),
            prompt_path: self.config.prompt.clone(),
            infer_mode: self.config.infer_mode.clone(),
        };
        match self.client.create_task(&req) {
            Ok(receipt) => {
                render::receipt(&receipt);
                self.last_task = Some(receipt.task_id);
            }
            Err(err) => render::error(&err),
        }
    }

    fn batch(&mut self, path: &str) {
        let speeches = match load_speeches(path) {
            Ok(speeches) => speeches,
            Err(err) => {
                render::error(&err);
                return;
            }
        };
        let req = CreateBatchTaskRequest {
            speeches,
            output_directory: self.config.output_dir.clone(),
            prompt_path: self.config.prompt.clone(),
            infer_mode: self.config.infer_mode.clone(),
        };
        match self.client.create_batch_task(&req) {
            Ok(receipt) => {
                render::receipt(&receipt);
                self.last_task = Some(receipt.task_id);
            }
            Err(err) => render::error(&err),
        }
    }

    fn wait(&self, task_id: &str) {
        let deadline = Instant::now() + WAIT_LIMIT;
        let mut last_status = String::new();
        loop {
            let task = match self.client.get_task(task_id) {
                Ok(task) => task,
                Err(err) => {
                    render::error(&err);
                    return;
                }
            };
            if task.is_finished() {
                render::task(&task);
                return;
            }
            let status = match (task.processed_files, task.total_files) {
                (Some(done), Some(total)) => format!("{} {}/{}", task.status, done, total),
                _ => task.status.clone(),
            };
            if status != last_status {
                render::info(&format!("... {}", status));
                last_status = status;
            }
            if Instant::now() >= deadline {
                render::error("gave up waiting");
                return;
            }
            thread::sleep(WAIT_INTERVAL);
        }
    }

    fn task_arg(&self, rest: &str) -> Option<String> {
        if !rest.is_empty() {
            return Some(rest.to_string());
        }
        match &self.last_task {
            Some(task_id) => Some(task_id.clone()),
            None => {
                render::error("no task id given and nothing queued yet");
                None
            }
        }
    }
}
