//! Schedule store and task detail cache
//!
//! Both live as single JSON blobs in a [`KvStore`]. A missing or corrupt blob
//! reads as empty and write failures are logged. A blob that cannot be read
//! is never overwritten.

use crate::models::{ScheduleRecord, TaskDetail};
use crate::storage::{KvStore, StorageError};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SCHEDULES_KEY: &str = "background_task_schedules";
pub const TASK_DETAILS_KEY: &str = "task_details";

/// Load a JSON blob for modification. Absence and corruption give
/// `T::default()`; a failed read is returned so the caller never saves over
/// data it could not see.
fn try_load_blob<T>(kv: &dyn KvStore, key: &str) -> Result<T, StorageError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match kv.get(key)? {
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!("Discarding corrupt blob '{}': {}", key, e);
                Ok(T::default())
            }
        },
        None => Ok(T::default()),
    }
}

/// Read-only view of a blob; a failed read looks empty.
fn load_blob<T>(kv: &dyn KvStore, key: &str) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    try_load_blob(kv, key).unwrap_or_else(|e| {
        tracing::warn!("Failed to read blob '{}': {}", key, e);
        T::default()
    })
}

fn save_blob<T: serde::Serialize>(kv: &dyn KvStore, key: &str, value: &T) {
    let result = serde_json::to_string(value)
        .map_err(StorageError::from)
        .and_then(|json| kv.put(key, &json));
    if let Err(e) = result {
        tracing::error!("Failed to save blob '{}': {}", key, e);
    }
}

/// One record per monitored task, persisted as a single list.
#[derive(Clone)]
pub struct ScheduleStore {
    kv: Arc<dyn KvStore>,
}

impl ScheduleStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn all(&self) -> Vec<ScheduleRecord> {
        load_blob(self.kv.as_ref(), SCHEDULES_KEY)
    }

    pub fn get(&self, task_id: &str) -> Option<ScheduleRecord> {
        self.all().into_iter().find(|r| r.task_id == task_id)
    }

    pub fn upsert(&self, record: ScheduleRecord) {
        let task_id = record.task_id.clone();
        let result = self.update(|records| {
            match records.iter_mut().find(|r| r.task_id == record.task_id) {
                Some(existing) => *existing = record,
                None => records.push(record),
            }
        });
        if let Err(e) = result {
            tracing::error!("Schedule for {} not saved: {}", task_id, e);
        }
    }

    /// Removes the record. Returns whether one existed.
    pub fn remove(&self, task_id: &str) -> bool {
        let result = self.update(|records| {
            let before = records.len();
            records.retain(|r| r.task_id != task_id);
            records.len() != before
        });
        result.unwrap_or_else(|e| {
            tracing::error!("Schedule for {} not removed: {}", task_id, e);
            false
        })
    }

    /// Load-mutate-save over the whole list. When the list cannot be read
    /// the mutator is not run and the stored blob is left alone.
    pub fn update<R>(
        &self,
        mutator: impl FnOnce(&mut Vec<ScheduleRecord>) -> R,
    ) -> Result<R, StorageError> {
        let mut records = try_load_blob(self.kv.as_ref(), SCHEDULES_KEY)?;
        let out = mutator(&mut records);
        save_blob(self.kv.as_ref(), SCHEDULES_KEY, &records);
        Ok(out)
    }
}

/// Descriptive fields per task, persisted as one `task_id -> detail` map.
#[derive(Clone)]
pub struct TaskDetailCache {
    kv: Arc<dyn KvStore>,
}

impl TaskDetailCache {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn all(&self) -> BTreeMap<String, TaskDetail> {
        load_blob(self.kv.as_ref(), TASK_DETAILS_KEY)
    }

    pub fn get(&self, task_id: &str) -> Option<TaskDetail> {
        self.all().remove(task_id)
    }

    pub fn upsert(&self, detail: TaskDetail) {
        let mut details: BTreeMap<String, TaskDetail> =
            match try_load_blob(self.kv.as_ref(), TASK_DETAILS_KEY) {
                Ok(details) => details,
                Err(e) => {
                    tracing::error!("Detail for {} not saved: {}", detail.task_id, e);
                    return;
                }
            };
        details.insert(detail.task_id.clone(), detail);
        save_blob(self.kv.as_ref(), TASK_DETAILS_KEY, &details);
    }

    pub fn remove(&self, task_id: &str) -> bool {
        let mut details: BTreeMap<String, TaskDetail> =
            match try_load_blob(self.kv.as_ref(), TASK_DETAILS_KEY) {
                Ok(details) => details,
                Err(e) => {
                    tracing::error!("Detail for {} not removed: {}", task_id, e);
                    return false;
                }
            };
        let removed = details.remove(task_id).is_some();
        if removed {
            save_blob(self.kv.as_ref(), TASK_DETAILS_KEY, &details);
        }
        removed
    }
}
