//! Authentication module owning the process-wide session.
//!
//! This module provides:
//! - `Session`: the current authentication state and identity snapshot
//! - `SessionManager`: login, logout, startup verification and forced reset,
//!   the only writer of session state and of auth-related credentials

pub mod manager;
pub mod session;

pub use manager::SessionManager;
pub use session::{Identity, Session, SessionState};

use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Bad caller input; no request was made
    #[error("{0}")]
    Validation(String),

    #[error("Unable to reach the server. Please check your connection.")]
    Connectivity(String),

    /// Not authenticated / bad credentials, with the server's wording
    #[error("{0}")]
    AuthRejected(String),

    /// Server reached but reported failure, with the server's wording
    #[error("{0}")]
    ServerError(String),

    #[error("Invalid response from server: {0}")]
    Malformed(String),

    #[error("Login successful but no user data received")]
    SessionDataMissing,

    #[error("Another sign-in is already in progress")]
    OperationInProgress,

    #[error("Not logged in")]
    NotAuthenticated,
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Connectivity(detail) => SessionError::Connectivity(detail),
            ApiError::Unauthorized(message) => SessionError::AuthRejected(message),
            ApiError::Rejected { message, .. } => SessionError::ServerError(message),
            ApiError::Malformed(detail) => SessionError::Malformed(detail),
        }
    }
}
