use std::env;

use crate::models::CLIConfig;

const DEFAULT_URL: &str = "http://localhost:51046";
const DEFAULT_OUTPUT: &str = "outputs";
const DEFAULT_MODE: &str = "normal";

pub fn parse_config() -> CLIConfig {
    let mut cfg = CLIConfig {
        base_url: env_or("TTS_QUEUE_URL", DEFAULT_URL.to_string()),
        output_dir: env_or("TTS_QUEUE_OUTPUT", DEFAULT_OUTPUT.to_string()),
        infer_mode: DEFAULT_MODE.to_string(),
        prompt: None,
    };
    if let Some(mode) = env_opt("TTS_QUEUE_MODE").and_then(|value| parse_mode(&value)) {
        cfg.infer_mode = mode.to_string();
    }

    let args: Vec<String> = env::args().collect();
    let mut idx = 1;
    while idx < args.len() {
        match args[idx].as_str() {
            "--base" => {
                if let Some(value) = args.get(idx + 1) {
                    cfg.base_url = value.clone();
                    idx += 1;
                }
            }
            "--output" => {
                if let Some(value) = args.get(idx + 1) {
                    cfg.output_dir = value.clone();
                    idx += 1;
                }
            }
            "--mode" => {
                if let Some(value) = args.get(idx + 1) {
                    if let Some(mode) = parse_mode(value) {
                        cfg.infer_mode = mode.to_string();
                    }
                    idx += 1;
                }
            }
            _ => {}
        }
        idx += 1;
    }

    cfg
}

/// Accepts the wire names and the short `fast` spelling.
pub fn parse_mode(value: &str) -> Option<&'static str> {
    match value.trim().to_lowercase().as_str() {
        "normal" | "普通推理" => Some("normal"),
        "batch-fast" | "fast" | "批次推理" => Some("batch-fast"),
        _ => None,
    }
}

fn env_or(key: &str, fallback: String) -> String {
    env_opt(key).unwrap_or(fallback)
}

fn env_opt(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}
