use std::fs;
use std::time::Duration;

use indexmap::IndexMap;
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{CreateBatchTaskRequest, CreateTaskRequest, TaskInfo, TaskReceipt};

pub struct HTTPClient {
    pub base_url: String,
    client: Client,
}

impl HTTPClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/tts{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn create_task(&self, req: &CreateTaskRequest) -> Result<TaskReceipt, String> {
        self.post("/tasks", req)
    }

    pub fn create_batch_task(&self, req: &CreateBatchTaskRequest) -> Result<TaskReceipt, String> {
        self.post("/batch_tasks", req)
    }

    pub fn get_task(&self, task_id: &str) -> Result<TaskInfo, String> {
        let resp = self
            .client
            .get(self.url(&format!("/tasks/{}", task_id)))
            .send()
            .map_err(|err| err.to_string())?;
        decode(resp)
    }

    pub fn list_tasks(&self, limit: usize) -> Result<Vec<TaskInfo>, String> {
        let resp = self
            .client
            .get(self.url(&format!("/tasks?limit={}", limit)))
            .send()
            .map_err(|err| err.to_string())?;
        let value: serde_json::Value = decode(resp)?;
        let tasks = value
            .get("tasks")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let mut out = Vec::new();
        for item in tasks {
            if let Ok(task) = serde_json::from_value::<TaskInfo>(item) {
                out.push(task);
            }
        }
        Ok(out)
    }

    pub fn list_prompts(&self) -> Result<Vec<String>, String> {
        let resp = self.client.get(self.url("/prompts")).send().map_err(|err| err.to_string())?;
        let value: serde_json::Value = decode(resp)?;
        Ok(value
            .get("prompts")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default())
    }

    fn post<T: Serialize, R: DeserializeOwned>(&self, path: &str, body: &T) -> Result<R, String> {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .map_err(|err| err.to_string())?;
        decode(resp)
    }
}

fn decode<R: DeserializeOwned>(resp: Response) -> Result<R, String> {
    if resp.status().is_success() {
        resp.json::<R>().map_err(|err| err.to_string())
    } else {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        let detail = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
            .unwrap_or(body);
        Err(format!("http {}: {}", status.as_u16(), detail))
    }
}

/// Reads a `{"file.wav": "text", ...}` script for `/batch`.
pub fn load_speeches(path: &str) -> Result<IndexMap<String, String>, String> {
    let raw = fs::read_to_string(path).map_err(|err| format!("{}: {}", path, err))?;
    let speeches: IndexMap<String, String> =
        serde_json::from_str(&raw).map_err(|err| format!("{}: {}", path, err))?;
    if speeches.is_empty() {
        return Err(format!("{}: no speeches", path));
    }
    Ok(speeches)
}
