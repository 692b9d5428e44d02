use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EngineConfig, ServerConfig};
use crate::engine::{
    CommandEngine, CommandEngineConfig, EngineError, EngineFactory, HttpEngine, HttpEngineConfig, SynthesisEngine,
};
use crate::error::ConfigError;

pub fn load_server_config() -> Result<ServerConfig, ConfigError> {
    load_server_config_from(|key| env::var(key).ok())
}

/// Applies `TTS_QUEUE_*` and `TTS_ENGINE*` overrides on top of the defaults.
pub fn load_server_config_from<F>(lookup: F) -> Result<ServerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let mut cfg = ServerConfig::default();

    if let Some(port) = get("TTS_QUEUE_PORT") {
        cfg.port = parse_value("TTS_QUEUE_PORT", &port)?;
    }
    if let Some(dir) = get("TTS_QUEUE_PROMPTS_DIR") {
        cfg.prompts_dir = PathBuf::from(dir);
    }
    if let Some(file) = get("TTS_QUEUE_PROMPT_INDEX") {
        cfg.prompt_index_file = PathBuf::from(file);
    }

    if let Some(file) = get("TTS_QUEUE_TASKS_FILE") {
        cfg.queue.tasks_file = match file.as_str() {
            "none" | "memory" => None,
            _ => Some(PathBuf::from(file)),
        };
    }
    if let Some(ms) = get("TTS_QUEUE_POLL_MS") {
        cfg.queue.poll_interval = Duration::from_millis(parse_value("TTS_QUEUE_POLL_MS", &ms)?);
    }
    if let Some(ms) = get("TTS_QUEUE_BACKOFF_MS") {
        cfg.queue.error_backoff = Duration::from_millis(parse_value("TTS_QUEUE_BACKOFF_MS", &ms)?);
    }
    if let Some(secs) = get("TTS_QUEUE_SHUTDOWN_SECS") {
        cfg.queue.shutdown_timeout = Duration::from_secs(parse_value("TTS_QUEUE_SHUTDOWN_SECS", &secs)?);
    }
    if let Some(flag) = get("TTS_QUEUE_EAGER_INIT") {
        cfg.queue.eager_engine_init = parse_value("TTS_QUEUE_EAGER_INIT", &flag)?;
    }

    let kind = get("TTS_ENGINE").unwrap_or_else(|| "http".to_string());
    cfg.engine = match kind.as_str() {
        "http" => {
            let mut http = HttpEngineConfig::default();
            if let Some(url) = get("TTS_ENGINE_URL") {
                http.base_url = url;
            }
            if let Some(secs) = get("TTS_ENGINE_TIMEOUT_SECS") {
                http.timeout = Duration::from_secs(parse_value("TTS_ENGINE_TIMEOUT_SECS", &secs)?);
            }
            EngineConfig::Http(http)
        }
        "command" => {
            let program = get("TTS_ENGINE_PROGRAM").ok_or_else(|| ConfigError::MissingSetting {
                key: "TTS_ENGINE_PROGRAM".to_string(),
                engine: kind.clone(),
            })?;
            let args = get("TTS_ENGINE_ARGS")
                .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            EngineConfig::Command(CommandEngineConfig {
                program: PathBuf::from(program),
                args,
            })
        }
        other => return Err(ConfigError::UnknownEngine(other.to_string())),
    };

    Ok(cfg)
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

pub fn build_engine_factory(cfg: &EngineConfig) -> Arc<dyn EngineFactory> {
    match cfg.clone() {
        EngineConfig::Http(http) => Arc::new(move || -> Result<Box<dyn SynthesisEngine>, EngineError> {
            Ok(Box::new(HttpEngine::connect(http.clone())?))
        }),
        EngineConfig::Command(command) => Arc::new(move || -> Result<Box<dyn SynthesisEngine>, EngineError> {
            Ok(Box::new(CommandEngine::new(command.clone())?))
        }),
    }
}

/// First `max_chars` characters, for log lines.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let cfg = load_server_config_from(lookup(&[])).unwrap();
        assert_eq!(cfg.port, 51046);
        assert_eq!(cfg.queue.tasks_file, Some(PathBuf::from("outputs/tts_queue_tasks.json")));
        assert_eq!(cfg.queue.poll_interval, Duration::from_secs(1));
        assert!(cfg.queue.eager_engine_init);
        assert!(matches!(cfg.engine, EngineConfig::Http(_)));
    }

    #[test]
    fn test_overrides_applied() {
        let cfg = load_server_config_from(lookup(&[
            ("TTS_QUEUE_PORT", "8080"),
            ("TTS_QUEUE_TASKS_FILE", "memory"),
            ("TTS_QUEUE_POLL_MS", "250"),
            ("TTS_QUEUE_EAGER_INIT", "false"),
            ("TTS_ENGINE_URL", "http://gpu-box:9000"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.queue.tasks_file, None);
        assert_eq!(cfg.queue.poll_interval, Duration::from_millis(250));
        assert!(!cfg.queue.eager_engine_init);
        match cfg.engine {
            EngineConfig::Http(http) => assert_eq!(http.base_url, "http://gpu-box:9000"),
            other => panic!("unexpected engine config: {:?}", other),
        }
    }

    #[test]
    fn test_command_engine_settings() {
        let cfg = load_server_config_from(lookup(&[
            ("TTS_ENGINE", "command"),
            ("TTS_ENGINE_PROGRAM", "/opt/tts/run.sh"),
            ("TTS_ENGINE_ARGS", "--model-dir checkpoints"),
        ]))
        .unwrap();
        match cfg.engine {
            EngineConfig::Command(command) => {
                assert_eq!(command.program, PathBuf::from("/opt/tts/run.sh"));
                assert_eq!(command.args, vec!["--model-dir", "checkpoints"]);
            }
            other => panic!("unexpected engine config: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert_eq!(
            load_server_config_from(lookup(&[("TTS_QUEUE_PORT", "not-a-port")])).unwrap_err(),
            ConfigError::InvalidValue {
                key: "TTS_QUEUE_PORT".to_string(),
                value: "not-a-port".to_string(),
            }
        );
        assert_eq!(
            load_server_config_from(lookup(&[("TTS_ENGINE", "grpc")])).unwrap_err(),
            ConfigError::UnknownEngine("grpc".to_string())
        );
        assert!(matches!(
            load_server_config_from(lookup(&[("TTS_ENGINE", "command")])).unwrap_err(),
            ConfigError::MissingSetting { .. }
        ));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("你好世界", 2), "你好...");
    }
}
