//! Multi-file upload pipeline.
//!
//! `UploadOrchestrator` sends a batch one file at a time, publishing live
//! state to the `ProgressRegistry`, and returns an `UploadBatch` that lists
//! exactly which files succeeded and which failed and why.

pub mod orchestrator;
pub mod progress;
pub mod task;

pub use orchestrator::{UploadOrchestrator, ALLOWED_MIME_TYPES, MAX_UPLOAD_BYTES};
pub use progress::{ProgressMap, ProgressRegistry, ProgressStatus, UploadProgress};
pub use task::{
    AggregateStatus, BatchError, CancelFlag, FileDescriptor, UploadBatch, UploadError,
    UploadStatus, UploadTask,
};
