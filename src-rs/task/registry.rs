use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use super::types::{StatusCounts, TaskRecord, TaskStatus};

/// Task id to record, in creation order.
pub type TaskMap = IndexMap<String, TaskRecord>;

/// In-memory source of truth shared by producers and the worker. Every access
/// goes through the one lock so a snapshot always sees a consistent registry.
pub struct TaskRegistry {
    tasks: Mutex<TaskMap>,
    wakeup: Condvar,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::from_tasks(TaskMap::new())
    }

    pub fn from_tasks(tasks: TaskMap) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            wakeup: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TaskMap> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or overwrites; uniqueness of ids is the caller's concern.
    pub fn put(&self, record: TaskRecord) {
        {
            let mut map = self.lock();
            map.insert(record.task_id().to_string(), record);
        }
        self.wakeup.notify_all();
    }

    pub fn get(&self, task_id: &str) -> Option<TaskRecord> {
        self.lock().get(task_id).cloned()
    }

    pub fn snapshot_for_save(&self) -> TaskMap {
        self.lock().clone()
    }

    pub fn scan_for_pending(&self) -> Option<TaskRecord> {
        self.lock()
            .values()
            .find(|record| record.status() == TaskStatus::Pending)
            .cloned()
    }

    /// Claims the oldest pending task in a single critical section and returns
    /// a copy of it as claimed.
    pub fn claim_next(&self, at: DateTime<Utc>) -> Option<TaskRecord> {
        let mut map = self.lock();
        let record = map
            .values_mut()
            .find(|record| record.status() == TaskStatus::Pending)?;
        record.claim(at).ok()?;
        Some(record.clone())
    }

    pub fn update<F, R>(&self, task_id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut TaskRecord) -> R,
    {
        let mut map = self.lock();
        map.get_mut(task_id).map(f)
    }

    /// Most recent first.
    pub fn list(&self, limit: usize) -> Vec<TaskRecord> {
        self.lock().values().rev().take(limit).cloned().collect()
    }

    pub fn ids_with_status(&self, status: TaskStatus) -> Vec<String> {
        self.lock()
            .values()
            .filter(|record| record.status() == status)
            .map(|record| record.task_id().to_string())
            .collect()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in self.lock().values() {
            counts.add(record.status());
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn notify(&self) {
        self.wakeup.notify_all();
    }

    /// Blocks until a task is inserted, `notify` is called, or `timeout` elapses.
    /// Returns at once when something is already pending.
    pub fn wait_for_work(&self, timeout: Duration) {
        let map = self.lock();
        if map.values().any(|record| record.status() == TaskStatus::Pending) {
            return;
        }
        let _ = self.wakeup.wait_timeout(map, timeout);
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::types::{InferMode, SingleTask};
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn single(id: &str) -> TaskRecord {
        TaskRecord::Single(SingleTask::new(id, "hello", "p.wav", format!("out/{}.wav", id), InferMode::Normal))
    }

    #[test]
    fn test_scan_returns_oldest_pending() {
        let registry = TaskRegistry::new();
        registry.put(single("t1"));
        registry.put(single("t2"));
        registry.put(single("t3"));

        assert_eq!(registry.scan_for_pending().unwrap().task_id(), "t1");
        registry.claim_next(Utc::now()).unwrap();
        assert_eq!(registry.scan_for_pending().unwrap().task_id(), "t2");
    }

    #[test]
    fn test_claim_next_follows_creation_order() {
        let registry = TaskRegistry::new();
        for id in ["b", "a", "c"] {
            registry.put(single(id));
        }
        let order: Vec<String> = std::iter::from_fn(|| registry.claim_next(Utc::now()))
            .map(|record| record.task_id().to_string())
            .collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert!(registry.claim_next(Utc::now()).is_none());
    }

    #[test]
    fn test_claimed_copy_matches_registry() {
        let registry = TaskRegistry::new();
        registry.put(single("t1"));
        let claimed = registry.claim_next(Utc::now()).unwrap();
        assert_eq!(claimed.status(), TaskStatus::Processing);
        assert_eq!(registry.get("t1"), Some(claimed));
    }

    #[test]
    fn test_get_is_repeatable() {
        let registry = TaskRegistry::new();
        registry.put(single("t1"));
        assert_eq!(registry.get("t1"), registry.get("t1"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_update_missing_task() {
        let registry = TaskRegistry::new();
        assert!(registry.update("nope", |record| record.status()).is_none());
    }

    #[test]
    fn test_list_newest_first() {
        let registry = TaskRegistry::new();
        for id in ["t1", "t2", "t3"] {
            registry.put(single(id));
        }
        let ids: Vec<String> = registry.list(2).iter().map(|r| r.task_id().to_string()).collect();
        assert_eq!(ids, vec!["t3", "t2"]);
    }

    #[test]
    fn test_counts_and_status_filter() {
        let registry = TaskRegistry::new();
        registry.put(single("t1"));
        registry.put(single("t2"));
        registry.claim_next(Utc::now());

        let counts = registry.counts();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 1);
        assert_eq!(registry.ids_with_status(TaskStatus::Processing), vec!["t1".to_string()]);
    }

    #[test]
    fn test_wait_returns_immediately_with_pending_work() {
        let registry = TaskRegistry::new();
        registry.put(single("t1"));
        let started = Instant::now();
        registry.wait_for_work(Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_put_wakes_waiter() {
        let registry = Arc::new(TaskRegistry::new());
        let waiter = {
            let registry = registry.clone();
            thread::spawn(move || {
                let started = Instant::now();
                registry.wait_for_work(Duration::from_secs(10));
                started.elapsed()
            })
        };
        thread::sleep(Duration::from_millis(50));
        registry.put(single("t1"));
        let waited = waiter.join().unwrap();
        assert!(waited < Duration::from_secs(5));
    }
}
