use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use indexmap::IndexMap;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use super::registry::{TaskMap, TaskRegistry};
use super::types::TaskRecord;
use crate::error::StoreError;

/// Mirrors the registry to a JSON file. Each save rewrites the whole file
/// through a temp file and rename, so a crash never leaves a torn file.
pub struct TaskStore {
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            write_lock: Mutex::new(()),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Restores the registry. A missing file is an empty registry; entries that
    /// fail to parse are skipped one by one.
    pub fn load(&self) -> TaskMap {
        let path = match &self.path {
            Some(path) => path,
            None => return TaskMap::new(),
        };
        match read_entries(path) {
            Ok(Some(entries)) => {
                let stored = entries.len();
                let tasks = decode_entries(entries);
                if tasks.len() < stored {
                    preserve_original(path);
                }
                info!(path = %path.display(), count = tasks.len(), skipped = stored - tasks.len(), "loaded tasks");
                tasks
            }
            Ok(None) => {
                info!(path = %path.display(), "no task file found, starting with an empty task list");
                TaskMap::new()
            }
            Err(err) => {
                error!(error = %err, "failed to load tasks");
                if matches!(err, StoreError::Decode { .. }) {
                    preserve_original(path);
                }
                TaskMap::new()
            }
        }
    }

    /// Snapshots the registry and writes it out. Failures are logged; the
    /// in-memory registry stays authoritative until the next save succeeds.
    pub fn save(&self, registry: &TaskRegistry) {
        let path = match &self.path {
            Some(path) => path,
            None => return,
        };
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = registry.snapshot_for_save();
        match write_atomic(path, &snapshot) {
            Ok(()) => debug!(path = %path.display(), count = snapshot.len(), "tasks saved"),
            Err(err) => error!(error = %err, "failed to save tasks"),
        }
    }

    pub fn write(&self, tasks: &TaskMap) -> Result<(), StoreError> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        write_atomic(path, tasks)
    }
}

fn read_entries(path: &Path) -> Result<Option<IndexMap<String, Value>>, StoreError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&data)
        .map(Some)
        .map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Where a task file is copied before its unreadable content gets replaced
/// by the next save.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".unreadable");
    path.with_file_name(name)
}

fn preserve_original(path: &Path) {
    let backup = backup_path(path);
    match fs::copy(path, &backup) {
        Ok(_) => warn!(path = %path.display(), backup = %backup.display(), "task file had unreadable entries, kept a copy"),
        Err(err) => error!(path = %path.display(), error = %err, "failed to back up unreadable task file"),
    }
}

fn decode_entries(entries: IndexMap<String, Value>) -> TaskMap {
    let mut tasks = TaskMap::with_capacity(entries.len());
    for (task_id, value) in entries {
        match serde_json::from_value::<TaskRecord>(value) {
            Ok(record) if record.task_id() == task_id => {
                tasks.insert(task_id, record);
            }
            Ok(record) => {
                warn!(%task_id, record_id = %record.task_id(), "skipping task stored under a different id");
            }
            Err(err) => {
                warn!(%task_id, error = %err, "skipping unreadable task");
            }
        }
    }
    tasks
}

fn write_atomic(path: &Path, tasks: &TaskMap) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(write_err)?;

    let serialized = serde_json::to_vec_pretty(tasks)?;
    let mut file = NamedTempFile::new_in(dir).map_err(write_err)?;
    file.write_all(&serialized).map_err(write_err)?;
    file.as_file().sync_all().map_err(write_err)?;
    file.persist(path).map_err(|source| StoreError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::types::{BatchTask, InferMode, SingleTask, TaskStatus};
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn completed_single(id: &str) -> TaskRecord {
        let start = Utc::now();
        let mut record = TaskRecord::Single(SingleTask::new(id, "done", "prompts/a.wav", "out/done.wav", InferMode::Normal));
        record.claim(start).unwrap();
        record
            .as_single_mut()
            .unwrap()
            .complete(start + Duration::milliseconds(2500))
            .unwrap();
        record
    }

    fn partial_batch(id: &str) -> TaskRecord {
        let speeches: IndexMap<String, String> = [("one.wav", "first"), ("two.wav", "second"), ("three.wav", "third")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut record = TaskRecord::Batch(BatchTask::new(id, speeches, "prompts/b.wav", "out/batch", InferMode::BatchFast));
        record.claim(Utc::now()).unwrap();
        let batch = record.as_batch_mut().unwrap();
        batch.record_success();
        batch.record_failure("two.wav", "device busy");
        record
    }

    fn map_of(records: Vec<TaskRecord>) -> TaskMap {
        records
            .into_iter()
            .map(|record| (record.task_id().to_string(), record))
            .collect()
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let temp = tempdir().unwrap();
        let store = TaskStore::new(temp.path().join("tasks.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_round_trip_mixed_records() {
        let temp = tempdir().unwrap();
        let store = TaskStore::new(temp.path().join("tasks.json"));
        let tasks = map_of(vec![
            TaskRecord::Single(SingleTask::new("t1", "pending", "prompts/a.wav", "out/t1.wav", InferMode::Normal)),
            completed_single("t2"),
            partial_batch("b1"),
        ]);
        store.write(&tasks).unwrap();

        let loaded = TaskStore::new(temp.path().join("tasks.json")).load();
        assert_eq!(loaded, tasks);
        let order: Vec<&String> = loaded.keys().collect();
        assert_eq!(order, vec!["t1", "t2", "b1"]);
        assert!(!backup_path(&temp.path().join("tasks.json")).exists());
    }

    #[test]
    fn test_restart_keeps_pending_and_completed() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("tasks.json");
        let registry = TaskRegistry::new();
        registry.put(TaskRecord::Single(SingleTask::new("waiting", "hi", "p.wav", "out/w.wav", InferMode::Normal)));
        registry.put(completed_single("finished"));
        TaskStore::new(&path).save(&registry);

        let loaded = TaskStore::new(&path).load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["waiting"].status(), TaskStatus::Pending);
        assert_eq!(loaded["finished"].status(), TaskStatus::Completed);
        assert_eq!(loaded["finished"], registry.get("finished").unwrap());
        assert_eq!(loaded["finished"].process_time(), Some(2.5));
    }

    #[test]
    fn test_malformed_entry_is_skipped() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("tasks.json");
        let good = completed_single("good");
        let mut doc = serde_json::Map::new();
        doc.insert("broken".to_string(), serde_json::json!({"task_type": "single", "status": "pending"}));
        doc.insert("good".to_string(), serde_json::to_value(&good).unwrap());
        doc.insert("alien".to_string(), serde_json::json!({"task_type": "video"}));
        fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        let loaded = TaskStore::new(&path).load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["good"], good);
        assert_eq!(fs::read_to_string(backup_path(&path)).unwrap(), serde_json::to_string(&doc).unwrap());
    }

    #[test]
    fn test_mismatched_key_is_skipped() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("tasks.json");
        let mut doc = serde_json::Map::new();
        doc.insert("other".to_string(), serde_json::to_value(completed_single("t1")).unwrap());
        fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        assert!(TaskStore::new(&path).load().is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("tasks.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(TaskStore::new(&path).load().is_empty());
        assert_eq!(fs::read_to_string(backup_path(&path)).unwrap(), "{ not json");
    }

    #[test]
    fn test_legacy_records_survive_the_next_save() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("tasks.json");
        let legacy = r#"{"20240101_120000_1": {"task_id": "20240101_120000_1", "text": "hi",
            "prompt_path": "prompts/a.wav", "output_path": "out/a.wav", "infer_mode": "普通推理",
            "status": "completed", "start_time": 1704110400.5, "end_time": 1704110402.0, "error": null}}"#;
        fs::write(&path, legacy).unwrap();

        let store = TaskStore::new(&path);
        assert!(store.load().is_empty());
        let registry = TaskRegistry::new();
        registry.put(completed_single("t1"));
        store.save(&registry);

        assert_eq!(fs::read_to_string(backup_path(&path)).unwrap(), legacy);
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn test_backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("outputs/tts_queue_tasks.json")),
            PathBuf::from("outputs/tts_queue_tasks.json.unreadable")
        );
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("state").join("tasks.json");
        let registry = TaskRegistry::new();
        registry.put(completed_single("t1"));
        TaskStore::new(&path).save(&registry);
        assert!(path.exists());
    }

    #[test]
    fn test_save_failure_is_swallowed() {
        let temp = tempdir().unwrap();
        let blocker = temp.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let store = TaskStore::new(blocker.join("tasks.json"));
        let registry = TaskRegistry::new();
        registry.put(completed_single("t1"));

        store.save(&registry);
        assert!(store.write(&registry.snapshot_for_save()).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_in_memory_store_is_noop() {
        let store = TaskStore::in_memory();
        let registry = TaskRegistry::new();
        registry.put(completed_single("t1"));
        store.save(&registry);
        assert!(store.path().is_none());
        assert!(store.load().is_empty());
    }
}
