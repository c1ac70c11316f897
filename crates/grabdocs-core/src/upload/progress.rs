use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use super::task::{UploadStatus, UploadTask, IN_FLIGHT_PERCENT_CAP};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum ProgressStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
}

/// What the display layer sees for one upload task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UploadProgress {
    pub task_id: String,
    pub file_name: String,
    pub percent: u8,
    pub status: ProgressStatus,
    pub error: Option<String>,
}

impl UploadProgress {
    fn from_task(task: &UploadTask) -> Self {
        let (status, error) = match task.status() {
            UploadStatus::Pending => (ProgressStatus::Pending, None),
            UploadStatus::InFlight => (ProgressStatus::Uploading, None),
            UploadStatus::Succeeded(_) => (ProgressStatus::Completed, None),
            UploadStatus::Failed(err) => (ProgressStatus::Failed, Some(err.to_string())),
        };
        Self {
            task_id: task.id().to_string(),
            file_name: task.descriptor().name.clone(),
            percent: task.progress_percent(),
            status,
            error,
        }
    }
}

pub type ProgressMap = BTreeMap<String, UploadProgress>;

/// Live map of upload progress keyed by task id.
///
/// Only the upload orchestrator writes; everyone else reads a snapshot or
/// subscribes for changes.
#[derive(Clone)]
pub struct ProgressRegistry {
    tx: Arc<watch::Sender<ProgressMap>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ProgressMap::new());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> ProgressMap {
        self.tx.borrow().clone()
    }

    pub fn get(&self, task_id: &str) -> Option<UploadProgress> {
        self.tx.borrow().get(task_id).cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressMap> {
        self.tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Publish the task's current state, never lowering a percent already shown.
    pub(crate) fn sync(&self, task: &UploadTask) {
        let mut entry = UploadProgress::from_task(task);
        self.tx.send_modify(|map| {
            if let Some(previous) = map.get(task.id()) {
                entry.percent = entry.percent.max(previous.percent);
            }
            map.insert(entry.task_id.clone(), entry);
        });
    }

    /// Raise the percent of an uploading task. Capped below 100; only a
    /// completed upload shows 100.
    pub(crate) fn record_percent(&self, task_id: &str, percent: u8) {
        let percent = percent.min(IN_FLIGHT_PERCENT_CAP);
        self.tx.send_if_modified(|map| match map.get_mut(task_id) {
            Some(entry) if entry.status == ProgressStatus::Uploading && percent > entry.percent => {
                entry.percent = percent;
                true
            }
            _ => false,
        });
    }

    pub(crate) fn remove_all(&self, task_ids: &[String]) {
        self.tx.send_if_modified(|map| {
            let before = map.len();
            for id in task_ids {
                map.remove(id);
            }
            map.len() != before
        });
    }
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new()
    }
}
