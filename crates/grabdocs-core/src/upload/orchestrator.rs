use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::progress::ProgressRegistry;
use super::task::{
    BatchError, CancelFlag, FileDescriptor, UploadBatch, UploadError, UploadTask,
    IN_FLIGHT_PERCENT_CAP,
};
use crate::api::{ApiClient, FilePart, ProgressFn, UPLOAD_FIELD};

/// Largest file the server accepts.
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/plain",
    "text/csv",
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
];

/// How long settled entries stay in the registry so the UI can show them.
const REGISTRY_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Uploads batches one file at a time through the `ApiClient`.
pub struct UploadOrchestrator {
    api: Arc<ApiClient>,
    registry: ProgressRegistry,
    grace_period: Duration,
    sequence: AtomicU64,
}

impl UploadOrchestrator {
    pub fn new(api: Arc<ApiClient>, registry: ProgressRegistry) -> Self {
        Self {
            api,
            registry,
            grace_period: REGISTRY_GRACE_PERIOD,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn registry(&self) -> &ProgressRegistry {
        &self.registry
    }

    /// Upload every file in order and return the settled batch.
    ///
    /// Per-file failures land in the batch, never in the `Err` path. An
    /// authorization loss or a cancellation fails the remaining files without
    /// sending them.
    pub async fn upload_batch(
        &self,
        files: Vec<FileDescriptor>,
        cancel: &CancelFlag,
    ) -> Result<UploadBatch, BatchError> {
        if files.is_empty() {
            return Err(BatchError::EmptyBatch);
        }

        let mut tasks: Vec<UploadTask> = files
            .into_iter()
            .map(|file| UploadTask::new(self.next_task_id(), file))
            .collect();
        for task in &tasks {
            self.registry.sync(task);
        }
        info!(files = tasks.len(), "Starting upload batch");

        let mut halted: Option<UploadError> = None;
        for task in tasks.iter_mut() {
            if halted.is_none() && cancel.is_cancelled() {
                info!("Upload batch cancelled");
                halted = Some(UploadError::Cancelled);
            }
            if let Some(reason) = &halted {
                task.fail(reason.clone());
                self.registry.sync(task);
                continue;
            }

            self.run_task(task).await;
            self.registry.sync(task);

            if task.error().is_some_and(UploadError::is_authorization_loss) {
                warn!(file = %task.descriptor().name, "Session lost during upload; skipping remaining files");
                halted = Some(UploadError::SessionInvalid);
            }
        }

        let batch = UploadBatch::new(tasks);
        info!(
            status = ?batch.aggregate_status(),
            succeeded = batch.successes().len(),
            failed = batch.failures().len(),
            "Upload batch settled"
        );
        self.schedule_cleanup(batch.task_ids());
        Ok(batch)
    }

    async fn run_task(&self, task: &mut UploadTask) {
        if let Err(e) = validate(task.descriptor()) {
            debug!(file = %task.descriptor().name, error = %e, "Upload rejected before sending");
            task.fail(e);
            return;
        }

        task.start();
        self.registry.sync(task);

        let bytes = match read_file(task.descriptor()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %task.descriptor().name, error = %e, "Could not read file");
                task.fail(e);
                return;
            }
        };

        let latest = Arc::new(AtomicU8::new(0));
        let progress: ProgressFn = {
            let registry = self.registry.clone();
            let task_id = task.id().to_string();
            let latest = latest.clone();
            Arc::new(move |sent, total| {
                let percent = percent_of(sent, total);
                latest.fetch_max(percent, Ordering::SeqCst);
                registry.record_percent(&task_id, percent);
            })
        };

        let file = task.descriptor();
        let part = FilePart {
            field: UPLOAD_FIELD,
            file_name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            bytes,
        };
        debug!(file = %file.name, "Uploading");
        let result = self.api.upload_file(part, Some(progress)).await;

        task.advance(latest.load(Ordering::SeqCst));
        match result {
            Ok(record) => {
                debug!(file = %task.descriptor().name, remote_id = record.id, "Upload complete");
                task.succeed(record);
            }
            Err(e) => {
                warn!(file = %task.descriptor().name, error = %e, "Upload failed");
                task.fail(e.into());
            }
        }
    }

    /// Drop the batch's registry entries once the grace period has passed.
    fn schedule_cleanup(&self, task_ids: Vec<String>) {
        let registry = self.registry.clone();
        let grace_period = self.grace_period;
        tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;
            registry.remove_all(&task_ids);
            debug!(tasks = task_ids.len(), "Cleared settled upload progress");
        });
    }

    fn next_task_id(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        format!(
            "upload_{}_{:06}_{:04x}",
            Utc::now().timestamp_millis(),
            seq,
            rand::random::<u16>()
        )
    }
}

fn validate(file: &FileDescriptor) -> Result<(), UploadError> {
    if file.name.trim().is_empty() {
        return Err(UploadError::Validation("File has no name".to_string()));
    }
    if let Some(size) = file.size {
        check_size(&file.name, size)?;
    }
    let mime = file
        .mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(UploadError::Validation(format!(
            "{}: file type '{}' is not supported",
            file.name, file.mime_type
        )));
    }
    Ok(())
}

fn check_size(name: &str, size: u64) -> Result<(), UploadError> {
    if size > MAX_UPLOAD_BYTES {
        return Err(UploadError::Validation(format!(
            "{}: file is larger than {} MB",
            name,
            MAX_UPLOAD_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

async fn read_file(file: &FileDescriptor) -> Result<Vec<u8>, UploadError> {
    let bytes = tokio::fs::read(file.local_path())
        .await
        .map_err(|e| UploadError::Io(format!("{}: {}", file.name, e)))?;
    check_size(&file.name, bytes.len() as u64)?;
    Ok(bytes)
}

fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = sent.saturating_mul(100) / total;
    percent.min(u64::from(IN_FLIGHT_PERCENT_CAP)) as u8
}

// ============================================================================
// Tests
// ============================================================================
