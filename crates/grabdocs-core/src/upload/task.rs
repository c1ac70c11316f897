use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::api::{ApiError, RemoteFile};

/// A file picked by the user, as handed over by the display layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Local path or `file://` URI
    pub uri: String,
    pub name: String,
    pub mime_type: String,
    /// Size reported by the picker, if any
    pub size: Option<u64>,
}

impl FileDescriptor {
    pub fn new(uri: impl Into<String>, name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn local_path(&self) -> PathBuf {
        PathBuf::from(self.uri.strip_prefix("file://").unwrap_or(&self.uri))
    }
}

/// Why a single file did not upload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("{0}")]
    Validation(String),

    #[error("Could not read file: {0}")]
    Io(String),

    #[error("Unable to reach the server: {0}")]
    Connectivity(String),

    #[error("{0}")]
    AuthRejected(String),

    #[error("{0}")]
    ServerError(String),

    #[error("Invalid response from server: {0}")]
    Malformed(String),

    /// Skipped because an earlier file lost the session
    #[error("Session is no longer valid")]
    SessionInvalid,

    #[error("Upload cancelled")]
    Cancelled,
}

impl UploadError {
    pub fn is_authorization_loss(&self) -> bool {
        matches!(self, UploadError::AuthRejected(_))
    }
}

impl From<ApiError> for UploadError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Connectivity(detail) => UploadError::Connectivity(detail),
            ApiError::Unauthorized(message) => UploadError::AuthRejected(message),
            ApiError::Rejected { message, .. } => UploadError::ServerError(message),
            ApiError::Malformed(detail) => UploadError::Malformed(detail),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchError {
    #[error("No files selected for upload")]
    EmptyBatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    InFlight,
    Succeeded(RemoteFile),
    Failed(UploadError),
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Succeeded(_) | UploadStatus::Failed(_))
    }
}

/// Highest percent a task can show before the server has accepted it.
pub(crate) const IN_FLIGHT_PERCENT_CAP: u8 = 99;

/// One file's passage through a batch.
///
/// Percent only moves up, and only reaches 100 on success. Once Succeeded or
/// Failed the task no longer changes.
#[derive(Debug, Clone)]
pub struct UploadTask {
    id: String,
    descriptor: FileDescriptor,
    status: UploadStatus,
    percent: u8,
}

impl UploadTask {
    pub(crate) fn new(id: String, descriptor: FileDescriptor) -> Self {
        Self {
            id,
            descriptor,
            status: UploadStatus::Pending,
            percent: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn descriptor(&self) -> &FileDescriptor {
        &self.descriptor
    }

    pub fn status(&self) -> &UploadStatus {
        &self.status
    }

    pub fn progress_percent(&self) -> u8 {
        self.percent
    }

    pub fn error(&self) -> Option<&UploadError> {
        match &self.status {
            UploadStatus::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn remote_record(&self) -> Option<&RemoteFile> {
        match &self.status {
            UploadStatus::Succeeded(record) => Some(record),
            _ => None,
        }
    }

    pub(crate) fn start(&mut self) {
        if self.status == UploadStatus::Pending {
            self.status = UploadStatus::InFlight;
        }
    }

    pub(crate) fn advance(&mut self, percent: u8) {
        if self.status == UploadStatus::InFlight {
            self.percent = self.percent.max(percent.min(IN_FLIGHT_PERCENT_CAP));
        }
    }

    pub(crate) fn succeed(&mut self, record: RemoteFile) {
        if self.status == UploadStatus::InFlight {
            self.status = UploadStatus::Succeeded(record);
            self.percent = 100;
        }
    }

    pub(crate) fn fail(&mut self, error: UploadError) {
        if !self.status.is_terminal() {
            self.status = UploadStatus::Failed(error);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateStatus {
    Success,
    PartialFailure,
    TotalFailure,
}

/// Settled result of one `upload_batch` call, in submission order.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    tasks: Vec<UploadTask>,
}

impl UploadBatch {
    pub(crate) fn new(tasks: Vec<UploadTask>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn successes(&self) -> Vec<(&FileDescriptor, &RemoteFile)> {
        self.tasks
            .iter()
            .filter_map(|t| t.remote_record().map(|r| (t.descriptor(), r)))
            .collect()
    }

    pub fn failures(&self) -> Vec<(&FileDescriptor, &UploadError)> {
        self.tasks
            .iter()
            .filter_map(|t| t.error().map(|e| (t.descriptor(), e)))
            .collect()
    }

    pub fn aggregate_status(&self) -> AggregateStatus {
        let succeeded = self.tasks.iter().filter(|t| t.remote_record().is_some()).count();
        if succeeded == self.tasks.len() {
            AggregateStatus::Success
        } else if succeeded == 0 {
            AggregateStatus::TotalFailure
        } else {
            AggregateStatus::PartialFailure
        }
    }

    /// Human-readable outcome, naming each failed file.
    pub fn summary(&self) -> String {
        let total = self.tasks.len();
        let failures = self.failures();
        let headline = match self.aggregate_status() {
            AggregateStatus::Success if total == 1 => return "File uploaded successfully".to_string(),
            AggregateStatus::Success => return format!("All {} files uploaded successfully", total),
            AggregateStatus::PartialFailure => {
                format!("{} of {} files uploaded", total - failures.len(), total)
            }
            AggregateStatus::TotalFailure => "No files were uploaded".to_string(),
        };

        let details: Vec<String> = failures
            .iter()
            .map(|(file, err)| format!("{}: {}", file.name, err))
            .collect();
        format!("{}. Failed: {}", headline, details.join("; "))
    }

    pub(crate) fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }
}

/// Cooperative cancellation for a batch, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
