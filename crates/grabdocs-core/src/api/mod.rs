//! Transport client for the GrabDocs REST API.
//!
//! `ApiClient` owns request construction, bearer injection, error
//! normalization and authorization-loss reporting. Actual I/O goes through an
//! `HttpBackend` (`ReqwestBackend` in production).

pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use client::{ApiClient, AuthLoss, AuthLossHandler, UPLOAD_FIELD};
pub use error::{ApiError, ErrorCategory};
pub use models::{
    LoginOutcome, LoginRequest, LoginResponse, ProfileUpdate, RemoteFile, SignupRequest,
    UserPayload,
};
pub use transport::{
    FilePart, HttpBackend, HttpRequest, HttpResponse, ProgressFn, ReqwestBackend, RequestBody,
    TransportFailure,
};
