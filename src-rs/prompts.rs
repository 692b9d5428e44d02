use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{error, info, warn};

const AUDIO_EXTENSIONS: [&str; 2] = [".wav", ".mp3"];

pub fn is_audio_file(name: &str) -> bool {
    let lowered = name.to_lowercase();
    AUDIO_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext))
}

/// A bare file name with no directory components.
pub fn is_plain_file_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty() && path.file_name().map(|f| f == path.as_os_str()).unwrap_or(false)
}

/// The shared pool of reference voice samples. When a caller does not pick
/// one, prompts are handed out round-robin and the last index survives
/// restarts in `index_file`.
pub struct PromptPool {
    dir: PathBuf,
    index_file: PathBuf,
    cursor: Mutex<()>,
}

impl PromptPool {
    pub fn new(dir: impl Into<PathBuf>, index_file: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            index_file: index_file.into(),
            cursor: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sorted audio file names in the pool directory.
    pub fn list(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    warn!(dir = %self.dir.display(), error = %err, "failed to list prompts");
                }
                return Vec::new();
            }
        };
        let mut prompts: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| is_audio_file(name))
            .collect();
        prompts.sort();
        prompts
    }

    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if !is_plain_file_name(name) || !is_audio_file(name) {
            return None;
        }
        let path = self.dir.join(name);
        path.is_file().then_some(path)
    }

    pub fn next_sequential(&self) -> Option<PathBuf> {
        let _guard = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let prompts = self.list();
        if prompts.is_empty() {
            warn!(dir = %self.dir.display(), "no prompts available for sequential selection");
            return None;
        }

        let next = match self.read_index() {
            Some(last) => (last + 1) % prompts.len(),
            None => 0,
        };
        if let Err(err) = fs::write(&self.index_file, next.to_string()) {
            error!(file = %self.index_file.display(), error = %err, "failed to write prompt index");
        }
        info!(prompt = %prompts[next], index = next, "selected prompt sequentially");
        Some(self.dir.join(&prompts[next]))
    }

    /// The requested prompt when it exists in the pool, otherwise the next one
    /// in rotation.
    pub fn select(&self, requested: Option<&str>) -> Option<PathBuf> {
        if let Some(name) = requested.filter(|name| !name.trim().is_empty()) {
            match self.resolve(name) {
                Some(path) => return Some(path),
                None => warn!(prompt = %name, dir = %self.dir.display(), "requested prompt not found, rotating"),
            }
        }
        self.next_sequential()
    }

    fn read_index(&self) -> Option<usize> {
        let raw = match fs::read_to_string(&self.index_file) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                error!(file = %self.index_file.display(), error = %err, "failed to read prompt index");
                return None;
            }
        };
        match raw.trim().parse::<usize>() {
            Ok(index) => Some(index),
            Err(_) => {
                warn!(file = %self.index_file.display(), content = %raw.trim(), "prompt index is not a number, resetting");
                None
            }
        }
    }
}
