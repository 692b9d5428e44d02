use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::types::{EngineError, SynthesisEngine};

#[derive(Clone, Debug, Default)]
pub struct CommandEngineConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Runs an external program once per utterance:
/// `<program> <args..> --text T --prompt P --output O [--fast]`.
pub struct CommandEngine {
    cfg: CommandEngineConfig,
}

impl CommandEngine {
    pub fn new(cfg: CommandEngineConfig) -> Result<Self, EngineError> {
        if cfg.program.as_os_str().is_empty() {
            return Err(EngineError::new("no engine program configured"));
        }
        // bare names are resolved through PATH at spawn time
        if cfg.program.components().count() > 1 && !cfg.program.is_file() {
            return Err(EngineError::new(format!(
                "engine program not found: {}",
                cfg.program.display()
            )));
        }
        Ok(Self { cfg })
    }

    fn invoke(&self, fast: bool, text: &str, prompt_path: &Path, output_path: &Path) -> Result<(), EngineError> {
        let mut cmd = Command::new(&self.cfg.program);
        cmd.args(&self.cfg.args)
            .arg("--text")
            .arg(text)
            .arg("--prompt")
            .arg(prompt_path)
            .arg("--output")
            .arg(output_path);
        if fast {
            cmd.arg("--fast");
        }
        debug!(program = %self.cfg.program.display(), fast, "running engine command");

        let output = cmd.output().map_err(|err| {
            EngineError::new(format!("failed to launch {}: {}", self.cfg.program.display(), err))
        })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            Err(EngineError::new(format!("engine exited with {}", output.status)))
        } else {
            Err(EngineError::new(stderr))
        }
    }
}

impl SynthesisEngine for CommandEngine {
    fn synthesize(&mut self, text: &str, prompt_path: &Path, output_path: &Path) -> Result<(), EngineError> {
        self.invoke(false, text, prompt_path, output_path)
    }

    fn synthesize_fast(&mut self, text: &str, prompt_path: &Path, output_path: &Path) -> Result<(), EngineError> {
        self.invoke(true, text, prompt_path, output_path)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> CommandEngine {
        CommandEngine::new(CommandEngineConfig {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string(), "engine".to_string()],
        })
        .unwrap()
    }

    #[test]
    fn test_missing_program_rejected() {
        let err = CommandEngine::new(CommandEngineConfig {
            program: PathBuf::from("/definitely/not/here/tts"),
            args: Vec::new(),
        })
        .err()
        .unwrap();
        assert!(err.message.contains("not found"));
        assert!(CommandEngine::new(CommandEngineConfig::default()).is_err());
    }

    #[test]
    fn test_success_exit() {
        let mut engine = shell("exit 0");
        engine
            .synthesize("hello", Path::new("p.wav"), Path::new("out.wav"))
            .unwrap();
    }

    #[test]
    fn test_stderr_becomes_error_message() {
        let mut engine = shell("echo 'device busy' >&2; exit 3");
        let err = engine
            .synthesize("hello", Path::new("p.wav"), Path::new("out.wav"))
            .unwrap_err();
        assert_eq!(err.to_string(), "device busy");
    }

    #[test]
    fn test_fast_flag_passed() {
        let mut engine = shell("for arg in \"$@\"; do [ \"$arg\" = --fast ] && exit 0; done; exit 1");
        engine
            .synthesize_fast("hello", Path::new("p.wav"), Path::new("out.wav"))
            .unwrap();
        assert!(engine
            .synthesize("hello", Path::new("p.wav"), Path::new("out.wav"))
            .is_err());
    }
}
