//! API client for the GrabDocs document service.
//!
//! Injects the stored bearer credential, decodes the response envelope,
//! normalizes failures into `ApiError`, and reports authorization loss.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, warn};

use crate::storage::{CredentialKey, CredentialStore};

use super::models::{
    Envelope, LoginRequest, LoginResponse, ProfileUpdate, RemoteFile, SignupRequest, UserPayload,
};
use super::transport::{FilePart, HttpBackend, HttpRequest, ProgressFn};
use super::ApiError;

// ============================================================================
// Endpoints
// ============================================================================

pub const AUTH_CHECK_PATH: &str = "/api/auth-check";
pub const LOGIN_PATH: &str = "/api/login";
pub const LOGOUT_PATH: &str = "/api/logout";
pub const SIGNUP_PATH: &str = "/api/signup";
pub const USER_PATH: &str = "/api/user";
pub const USER_UPDATE_PATH: &str = "/api/user/update";
pub const UPLOAD_PATH: &str = "/api/upload";

/// Multipart field the upload endpoint reads files from
pub const UPLOAD_FIELD: &str = "files";

/// Details of a request the server refused as unauthenticated.
#[derive(Debug, Clone)]
pub struct AuthLoss {
    pub path: String,
    /// Session generation current when the request was sent
    pub generation: u64,
}

/// Invoked once per 401. Must not block; spawn any real work.
pub type AuthLossHandler = Arc<dyn Fn(AuthLoss) + Send + Sync>;

pub struct ApiClient {
    backend: Arc<dyn HttpBackend>,
    credentials: Arc<CredentialStore>,
    on_auth_loss: RwLock<Option<AuthLossHandler>>,
    generation: AtomicU64,
}

impl ApiClient {
    pub fn new(backend: Arc<dyn HttpBackend>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            backend,
            credentials,
            on_auth_loss: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Register the callback fired when the server reports the caller as
    /// unauthenticated. Replaces any previous handler.
    pub fn set_auth_loss_handler(&self, handler: AuthLossHandler) {
        match self.on_auth_loss.write() {
            Ok(mut slot) => *slot = Some(handler),
            Err(_) => warn!("Auth-loss handler lock poisoned; handler not installed"),
        }
    }

    /// Identifies the session requests are currently sent under.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start a new session generation and return it. Called once a login
    /// succeeds.
    pub(crate) fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn notify_auth_loss(&self, path: &str, generation: u64) {
        let handler = self.on_auth_loss.read().ok().and_then(|slot| slot.clone());
        match handler {
            Some(handler) => handler(AuthLoss {
                path: path.to_string(),
                generation,
            }),
            None => debug!(path = path, "Authorization lost with no handler registered"),
        }
    }

    async fn bearer(&self) -> Option<String> {
        match self.credentials.get(CredentialKey::AuthToken).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read auth token; sending request without it");
                None
            }
        }
    }

    /// Send a request and return the decoded envelope of a successful response.
    ///
    /// A 401 fires the auth-loss handler before the error is returned; the
    /// request is never retried here.
    pub async fn send(
        &self,
        mut request: HttpRequest,
        progress: Option<ProgressFn>,
    ) -> Result<Envelope, ApiError> {
        let generation = self.generation();
        request.bearer = self.bearer().await;
        let path = request.path.clone();

        let response = self.backend.execute(request, progress).await.map_err(|e| {
            warn!(path = %path, error = %e, "Request did not reach the server");
            ApiError::Connectivity(e.to_string())
        })?;

        let parsed = serde_json::from_slice::<Envelope>(&response.body);

        if response.status == 401 {
            let message = parsed.ok().and_then(|env| env.message);
            self.notify_auth_loss(&path, generation);
            return Err(ApiError::from_status(401, message, ""));
        }

        if !response.is_success() {
            let message = parsed.ok().and_then(|env| env.message);
            let err = ApiError::from_status(response.status, message, &response.text());
            debug!(path = %path, status = response.status, error = %err, "Request rejected");
            return Err(err);
        }

        let envelope = parsed.map_err(|e| ApiError::Malformed(format!("{}: {}", path, e)))?;
        if !envelope.success {
            return Err(ApiError::Rejected {
                status: response.status,
                message: envelope
                    .message
                    .unwrap_or_else(|| "Request failed".to_string()),
            });
        }

        Ok(envelope)
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<Envelope, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::Malformed(format!("could not encode request: {}", e)))?;
        self.send(HttpRequest::post(path).json(body), None).await
    }

    // ===== Authentication =====

    /// Ask the server whether the stored credential is still valid.
    /// Returns the server's view of the user.
    pub async fn verify_session(&self) -> Result<serde_json::Value, ApiError> {
        let envelope = self.send(HttpRequest::get(AUTH_CHECK_PATH), None).await?;
        match envelope.data {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(ApiError::Malformed("auth check returned no identity".to_string())),
        }
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        debug!(username = %request.username, "Attempting login");
        let envelope = self.post_json(LOGIN_PATH, request).await?;
        LoginResponse::from_envelope(envelope)
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.send(HttpRequest::post(LOGOUT_PATH), None).await?;
        Ok(())
    }

    /// Returns the server's confirmation message.
    pub async fn signup(&self, request: &SignupRequest) -> Result<String, ApiError> {
        let envelope = self.post_json(SIGNUP_PATH, request).await?;
        Ok(envelope
            .message
            .unwrap_or_else(|| "Signup successful".to_string()))
    }

    // ===== Profile =====

    pub async fn fetch_profile(&self) -> Result<UserPayload, ApiError> {
        let envelope = self.send(HttpRequest::get(USER_PATH), None).await?;
        // Older servers answer with `user`, newer with `data`
        match envelope.user.clone().filter(|u| !u.is_null()) {
            Some(user) => serde_json::from_value(user)
                .map_err(|e| ApiError::Malformed(format!("profile: {}", e))),
            None => envelope.decode_data("profile"),
        }
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserPayload, ApiError> {
        let body = serde_json::to_value(update)
            .map_err(|e| ApiError::Malformed(format!("could not encode request: {}", e)))?;
        let envelope = self.send(HttpRequest::put(USER_UPDATE_PATH).json(body), None).await?;
        envelope.decode_data("profile update")
    }

    // ===== Files =====

    pub async fn upload_file(
        &self,
        part: FilePart,
        progress: Option<ProgressFn>,
    ) -> Result<RemoteFile, ApiError> {
        let file_name = part.file_name.clone();
        let envelope = self
            .send(HttpRequest::post(UPLOAD_PATH).file(part), progress)
            .await?;
        let record: RemoteFile = envelope.decode_data("upload")?;
        debug!(file = %file_name, remote_id = record.id, "Upload stored");
        Ok(record)
    }
}

// ============================================================================
// Tests
// ============================================================================
