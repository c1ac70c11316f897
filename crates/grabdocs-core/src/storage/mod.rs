//! Credential storage for the session token and identity snapshot.
//!
//! This module provides:
//! - `CredentialKey`: the fixed set of keys the app reads, writes or must clear
//! - `StorageBackend`: a blocking key/value backend (`KeyringBackend`,
//!   `FileBackend`, `MemoryBackend`)
//! - `CredentialStore`: the async facade that picks a backend, bounds every
//!   call with a timeout, and performs the best-effort `clear_all`

pub mod backend;
pub mod file;
pub mod keyring;
pub mod keys;
pub mod store;

pub use backend::{MemoryBackend, StorageBackend};
pub use file::FileBackend;
pub use keyring::KeyringBackend;
pub use keys::CredentialKey;
pub use store::{ClearReport, CredentialStore};

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Platform-specific storage error (keychain locked, no secret service, ...)
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Backend did not answer in time
    #[error("Storage backend '{0}' timed out")]
    Timeout(&'static str),

    /// No backend configured
    #[error("No storage backend available")]
    NoBackend,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
