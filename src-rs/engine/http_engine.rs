use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::json;
use tracing::debug;

use super::types::{EngineError, SynthesisEngine};

#[derive(Clone, Debug)]
pub struct HttpEngineConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for HttpEngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9880".to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Talks to a model server that keeps the voice model resident. The server
/// answers `POST /synthesize` with the raw audio bytes.
pub struct HttpEngine {
    cfg: HttpEngineConfig,
    client: Client,
}

impl HttpEngine {
    /// Builds the client and probes `/health`, so an unreachable server fails
    /// initialization rather than the first task.
    pub fn connect(cfg: HttpEngineConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|err| EngineError::new(format!("failed to build http client: {}", err)))?;
        let endpoint = format!("{}/health", cfg.base_url.trim_end_matches('/'));
        let resp = client
            .get(&endpoint)
            .send()
            .map_err(|err| EngineError::new(format!("engine unreachable at {}: {}", endpoint, err)))?;
        if !resp.status().is_success() {
            return Err(EngineError::new(format!(
                "engine health check failed: http {}",
                resp.status().as_u16()
            )));
        }
        Ok(Self { cfg, client })
    }

    fn request(&self, mode: &str, text: &str, prompt_path: &Path, output_path: &Path) -> Result<(), EngineError> {
        let endpoint = format!("{}/synthesize", self.cfg.base_url.trim_end_matches('/'));
        let payload = json!({
            "text": text,
            "prompt_path": prompt_path.to_string_lossy(),
            "mode": mode,
        });
        debug!(%endpoint, mode, "sending synthesis request");
        let resp = self
            .client
            .post(endpoint)
            .json(&payload)
            .send()
            .map_err(|err| EngineError::new(err.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(EngineError::new(format!("engine http {}: {}", status.as_u16(), body.trim())));
        }
        let audio = resp.bytes().map_err(|err| EngineError::new(err.to_string()))?;
        if audio.is_empty() {
            return Err(EngineError::new("engine returned no audio"));
        }
        fs::write(output_path, &audio)
            .map_err(|err| EngineError::new(format!("failed to write {}: {}", output_path.display(), err)))
    }
}

impl SynthesisEngine for HttpEngine {
    fn synthesize(&mut self, text: &str, prompt_path: &Path, output_path: &Path) -> Result<(), EngineError> {
        self.request("normal", text, prompt_path, output_path)
    }

    fn synthesize_fast(&mut self, text: &str, prompt_path: &Path, output_path: &Path) -> Result<(), EngineError> {
        self.request("fast", text, prompt_path, output_path)
    }
}
