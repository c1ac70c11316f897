//! Explicit wiring of the client runtime.
//!
//! Hosts build one `Services` at startup and hand its parts to the display
//! layer; nothing in the crate reaches for a global.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::api::{ApiClient, HttpBackend, ReqwestBackend};
use crate::auth::SessionManager;
use crate::config::Config;
use crate::storage::CredentialStore;
use crate::upload::{ProgressRegistry, UploadOrchestrator};

pub struct Services {
    pub credentials: Arc<CredentialStore>,
    pub api: Arc<ApiClient>,
    pub session: Arc<SessionManager>,
    pub uploads: Arc<UploadOrchestrator>,
}

impl Services {
    /// Production wiring: reqwest transport, keychain with file fallback.
    pub fn connect(config: &Config) -> Result<Self> {
        let base_url = config.resolve_base_url();
        let backend = ReqwestBackend::new(base_url.as_str())
            .context("Failed to build HTTP client")?;
        let credentials =
            CredentialStore::platform_default().context("Failed to open credential store")?;

        info!(base_url = %base_url, "Client services ready");
        Ok(Self::assemble(Arc::new(backend), Arc::new(credentials)))
    }

    pub fn assemble(backend: Arc<dyn HttpBackend>, credentials: Arc<CredentialStore>) -> Self {
        let api = Arc::new(ApiClient::new(backend, credentials.clone()));
        let session = SessionManager::new(api.clone(), credentials.clone());
        let uploads = Arc::new(UploadOrchestrator::new(api.clone(), ProgressRegistry::new()));
        Self {
            credentials,
            api,
            session,
            uploads,
        }
    }

    pub fn progress(&self) -> &ProgressRegistry {
        self.uploads.registry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::{AUTH_CHECK_PATH, LOGIN_PATH, LOGOUT_PATH, UPLOAD_PATH};
    use crate::auth::{Session, SessionState};
    use crate::storage::CredentialKey;
    use crate::test_support::{memory_store, ScriptedBackend};
    use crate::upload::{AggregateStatus, CancelFlag, FileDescriptor, UploadError};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn services() -> (Services, Arc<ScriptedBackend>) {
        let backend = ScriptedBackend::new();
        let (store, _, _) = memory_store();
        (Services::assemble(backend.clone(), store), backend)
    }

    async fn session_keys_present(services: &Services) -> Vec<CredentialKey> {
        let mut present = Vec::new();
        for key in CredentialKey::SESSION_KEYS {
            if services.credentials.has(key).await.unwrap() {
                present.push(key);
            }
        }
        present
    }

    #[tokio::test]
    async fn test_upload_auth_loss_signs_user_out() {
        let dir = TempDir::new().unwrap();
        let (services, backend) = services();
        backend.push_json(LOGIN_PATH, 200, json!({"success": true, "user": {"id": 7, "email": "alice@x.com"}}));
        backend.push_json(UPLOAD_PATH, 401, json!({"success": false, "message": "Not authenticated"}));

        services.session.login("alice", "correct-password", None).await.unwrap();
        assert!(services.session.current().is_authenticated());

        let files: Vec<FileDescriptor> = ["a.pdf", "b.pdf", "c.pdf"]
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                std::fs::write(&path, b"%PDF-1.4").unwrap();
                FileDescriptor::new(path.display().to_string(), *name, "application/pdf")
            })
            .collect();
        let batch = services.uploads.upload_batch(files, &CancelFlag::new()).await.unwrap();

        assert_eq!(batch.aggregate_status(), AggregateStatus::TotalFailure);
        assert!(batch.failures()[0].1.is_authorization_loss());
        assert_eq!(batch.failures()[2].1, &UploadError::SessionInvalid);
        assert_eq!(backend.count(UPLOAD_PATH), 1);

        let mut rx = services.session.subscribe();
        tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| s.state == SessionState::Unauthenticated),
        )
        .await
        .expect("session was not reset")
        .unwrap();
        assert!(session_keys_present(&services).await.is_empty());
        assert_eq!(backend.count(LOGOUT_PATH), 0);
    }

    #[tokio::test]
    async fn test_login_logout_cycle_leaves_nothing_behind() {
        let (services, backend) = services();
        backend.push_json(
            LOGIN_PATH,
            200,
            json!({"success": true, "user": {"id": 7, "email": "alice@x.com"}, "token": "t-1"}),
        );
        backend.push_unreachable(LOGOUT_PATH);

        services.session.login("alice", "pw", None).await.unwrap();
        assert_eq!(session_keys_present(&services).await, [CredentialKey::User, CredentialKey::AuthToken]);

        services.session.logout().await;
        assert_eq!(services.session.current(), Session::unauthenticated());
        assert!(session_keys_present(&services).await.is_empty());
    }

    #[tokio::test]
    async fn test_restart_restores_verified_session() {
        let backend = ScriptedBackend::new();
        let (store, _, _) = memory_store();
        backend.push_json(LOGIN_PATH, 200, json!({"success": true, "user": {"id": 7, "username": "alice"}}));
        backend.push_json(AUTH_CHECK_PATH, 200, json!({"success": true, "data": {"id": 7}}));

        let first = Services::assemble(backend.clone(), store.clone());
        let identity = first.session.login("alice", "pw", None).await.unwrap();
        drop(first);

        let second = Services::assemble(backend.clone(), store);
        assert_eq!(second.session.current().state, SessionState::Unauthenticated);
        let session = second.session.check_session().await;
        assert_eq!(session.state, SessionState::Authenticated);
        assert_eq!(session.identity, Some(identity));
        assert_eq!(
            backend.requests().last().and_then(|r| r.bearer.clone()).as_deref(),
            Some(crate::auth::manager::SESSION_TOKEN_PLACEHOLDER)
        );
    }
}
