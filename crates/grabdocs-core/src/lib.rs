//! GrabDocs Core Library
//!
//! Client runtime for the GrabDocs document service: the credential store,
//! the REST transport, the session lifecycle and the multi-file upload
//! pipeline. Display code consumes it through `Services`.

pub mod api;
pub mod auth;
pub mod config;
pub mod logging;
pub mod services;
pub mod storage;
pub mod upload;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at crate root
pub use api::{ApiClient, ApiError, ErrorCategory, HttpBackend, ReqwestBackend};
pub use auth::{Identity, Session, SessionError, SessionManager, SessionState};
pub use config::Config;
pub use services::Services;
pub use storage::{CredentialKey, CredentialStore, StorageBackend, StorageError};
pub use upload::{
    AggregateStatus, BatchError, CancelFlag, FileDescriptor, ProgressRegistry, UploadBatch,
    UploadError, UploadOrchestrator, UploadProgress,
};
