use std::sync::{Arc, Weak};

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::{Identity, Session, SessionError, SessionState};
use crate::api::{ApiClient, AuthLoss, LoginOutcome, LoginRequest, ProfileUpdate, SignupRequest};
use crate::storage::{CredentialKey, CredentialStore};

/// Stored as the bearer when the server authenticates by cookie and sends no token.
pub const SESSION_TOKEN_PLACEHOLDER: &str = "session_token";

const MIN_PASSWORD_LENGTH: usize = 6;

/// Owns the process-wide `Session` and every auth-related credential write.
///
/// Session operations are serialized by one guard: `login` refuses to start
/// while another operation holds it, everything else waits its turn.
pub struct SessionManager {
    api: Arc<ApiClient>,
    credentials: Arc<CredentialStore>,
    session: watch::Sender<Session>,
    op_guard: Mutex<()>,
    me: Weak<SessionManager>,
}

impl SessionManager {
    /// Create the manager and register it as the client's auth-loss handler.
    pub fn new(api: Arc<ApiClient>, credentials: Arc<CredentialStore>) -> Arc<Self> {
        let manager = Arc::new_cyclic(|me: &Weak<Self>| Self {
            api,
            credentials,
            session: watch::channel(Session::unauthenticated()).0,
            op_guard: Mutex::new(()),
            me: me.clone(),
        });

        let weak = Arc::downgrade(&manager);
        manager.api.set_auth_loss_handler(Arc::new(move |loss: AuthLoss| {
            let Some(manager) = weak.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                manager.reset_after_auth_loss(loss).await;
            });
        }));

        manager
    }

    pub fn current(&self) -> Session {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    fn publish(&self, session: Session) {
        debug!(state = ?session.state, "Session transition");
        self.session.send_replace(session);
    }

    // ===== Startup =====

    /// Verify a stored identity with the server. Anything short of a
    /// confirmed session leaves the process Unauthenticated with a clean store.
    pub async fn check_session(&self) -> Session {
        let _guard = self.op_guard.lock().await;

        let raw = match self.credentials.get(CredentialKey::User).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No stored identity");
                return self.current();
            }
            Err(e) => {
                warn!(error = %e, "Could not read stored identity; starting signed out");
                return self.current();
            }
        };

        let identity: Identity = match serde_json::from_str(&raw) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Stored identity is corrupt; resetting");
                self.reset_locked().await;
                return self.current();
            }
        };

        let credential_present = self.token_present().await;
        self.publish(Session {
            state: SessionState::Authenticating,
            identity: None,
            credential_present,
        });

        match self.api.verify_session().await {
            Ok(_) => {
                info!(user_id = identity.id, "Stored session verified");
                self.publish(Session::authenticated(identity, credential_present));
            }
            Err(e) => {
                info!(error = %e, "Stored session rejected; resetting");
                self.reset_locked().await;
            }
        }

        self.current()
    }

    // ===== Login / logout =====

    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
        remember: Option<bool>,
    ) -> Result<Identity, SessionError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || secret.is_empty() {
            return Err(SessionError::Validation(
                "Please enter both username and password".to_string(),
            ));
        }

        let _guard = self
            .op_guard
            .try_lock()
            .map_err(|_| SessionError::OperationInProgress)?;

        self.publish(Session {
            state: SessionState::Authenticating,
            identity: None,
            credential_present: false,
        });

        match self.authenticate(identifier, secret, remember).await {
            Ok((identity, needs_profile)) => {
                // Deferred work started under an older login must not touch this one
                let generation = self.api.advance_generation();
                info!(user_id = identity.id, "Logged in");
                self.publish(Session::authenticated(identity.clone(), true));
                if needs_profile {
                    self.spawn_enrichment(identity.id, generation);
                }
                Ok(identity)
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                self.reset_locked().await;
                Err(e)
            }
        }
    }

    /// Call the login endpoint and persist what it returned.
    /// The flag is true when the identity was synthesized and worth enriching.
    async fn authenticate(
        &self,
        identifier: &str,
        secret: &str,
        remember: Option<bool>,
    ) -> Result<(Identity, bool), SessionError> {
        let request = LoginRequest {
            username: identifier.to_string(),
            password: secret.to_string(),
            remember,
        };
        let response = self.api.login(&request).await?;

        let (identity, session_id, needs_profile) = match response.outcome {
            LoginOutcome::FullIdentity(user) => (Identity::from_payload(&user, identifier), None, false),
            LoginOutcome::SessionReference { user_id, session_id } => {
                debug!(user_id = user_id, "Login returned a session reference only");
                (Identity::minimal(user_id, identifier), session_id, true)
            }
            LoginOutcome::Neither => return Err(SessionError::SessionDataMissing),
        };

        self.persist_identity(&identity).await;

        let token = response
            .token
            .unwrap_or_else(|| SESSION_TOKEN_PLACEHOLDER.to_string());
        if let Err(e) = self.credentials.set(CredentialKey::AuthToken, &token).await {
            warn!(error = %e, "Failed to persist auth token");
        }
        if let Some(session_id) = session_id {
            if let Err(e) = self.credentials.set(CredentialKey::SessionId, &session_id).await {
                warn!(error = %e, "Failed to persist session id");
            }
        }

        self.remember_identifier(identifier, remember).await;
        Ok((identity, needs_profile))
    }

    /// Always ends Unauthenticated with the session keys cleared, whatever the
    /// logout endpoint says.
    pub async fn logout(&self) {
        let _guard = self.op_guard.lock().await;

        let current = self.current();
        if current.state == SessionState::Unauthenticated {
            debug!("Logout while signed out; clearing local state only");
        } else {
            self.publish(Session {
                state: SessionState::Invalidating,
                identity: None,
                credential_present: current.credential_present,
            });
            match self.api.logout().await {
                Ok(()) => debug!("Server session ended"),
                Err(e) => warn!(error = %e, "Logout request failed; continuing with local cleanup"),
            }
        }

        self.reset_locked().await;
        info!("Logged out");
    }

    /// Drop the session and stored credentials without contacting the server.
    pub async fn force_reset(&self) {
        let _guard = self.op_guard.lock().await;
        self.reset_locked().await;
    }

    /// A 401 only resets the session its request was sent under.
    async fn reset_after_auth_loss(&self, loss: AuthLoss) {
        let _guard = self.op_guard.lock().await;
        if self.api.generation() != loss.generation {
            debug!(path = %loss.path, "Ignoring authorization loss from an earlier session");
            return;
        }
        info!(path = %loss.path, "Authorization lost; resetting session");
        self.reset_locked().await;
    }

    /// Caller must hold `op_guard`.
    async fn reset_locked(&self) {
        self.credentials.clear_all(&CredentialKey::SESSION_KEYS).await;
        self.publish(Session::unauthenticated());
    }

    // ===== Profile =====

    fn spawn_enrichment(&self, user_id: i64, generation: u64) {
        let Some(manager) = self.me.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            manager.enrich_profile(user_id, generation).await;
        });
    }

    /// Replace a synthesized identity with the server profile when it arrives.
    async fn enrich_profile(&self, user_id: i64, generation: u64) {
        let profile = match self.api.fetch_profile().await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(user_id = user_id, error = %e, "Profile enrichment failed");
                return;
            }
        };
        if profile.id != user_id {
            warn!(expected = user_id, got = profile.id, "Profile belongs to another user; ignoring");
            return;
        }

        let _guard = self.op_guard.lock().await;
        let current = self.current();
        let Some(existing) = current.identity.as_ref() else {
            return;
        };
        if self.api.generation() != generation || !current.is_authenticated() {
            debug!(user_id = user_id, "Session changed before profile arrived");
            return;
        }

        let identity = Identity::from_payload(&profile, &existing.username);
        self.persist_identity(&identity).await;
        debug!(user_id = user_id, "Profile enriched");
        self.publish(Session::authenticated(identity, current.credential_present));
    }

    pub async fn refresh_profile(&self) -> Result<Identity, SessionError> {
        let _guard = self.op_guard.lock().await;
        let (existing, credential_present) = self.authenticated_identity()?;

        let profile = self.api.fetch_profile().await?;
        let identity = Identity::from_payload(&profile, &existing.username);
        self.persist_identity(&identity).await;
        self.publish(Session::authenticated(identity.clone(), credential_present));
        Ok(identity)
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Identity, SessionError> {
        if update.is_empty() {
            return Err(SessionError::Validation("Nothing to update".to_string()));
        }
        if update.email.as_deref().is_some_and(|email| !email.contains('@')) {
            return Err(SessionError::Validation("Please enter a valid email address".to_string()));
        }

        let _guard = self.op_guard.lock().await;
        let (existing, credential_present) = self.authenticated_identity()?;

        let profile = self.api.update_profile(&update).await?;
        let identity = Identity::from_payload(&profile, &existing.username);
        self.persist_identity(&identity).await;
        info!(user_id = identity.id, "Profile updated");
        self.publish(Session::authenticated(identity.clone(), credential_present));
        Ok(identity)
    }

    fn authenticated_identity(&self) -> Result<(Identity, bool), SessionError> {
        let current = self.current();
        match current.identity {
            Some(identity) if current.state == SessionState::Authenticated => {
                Ok((identity, current.credential_present))
            }
            _ => Err(SessionError::NotAuthenticated),
        }
    }

    // ===== Account =====

    /// Create an account. Does not sign in; returns the server's message.
    pub async fn signup(&self, request: SignupRequest) -> Result<String, SessionError> {
        if request.username.trim().is_empty()
            || request.email.trim().is_empty()
            || request.password.trim().is_empty()
        {
            return Err(SessionError::Validation("Please fill in all fields".to_string()));
        }
        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(SessionError::Validation(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LENGTH
            )));
        }

        let message = self.api.signup(&request).await?;
        info!(username = %request.username, "Account created");
        Ok(message)
    }

    /// Identifier saved by the last login with `remember = true`.
    pub async fn remembered_username(&self) -> Option<String> {
        match self.credentials.get(CredentialKey::RememberedUsername).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Could not read remembered username");
                None
            }
        }
    }

    // ===== Store helpers =====

    async fn persist_identity(&self, identity: &Identity) {
        if let Err(e) = self.credentials.set_json(CredentialKey::User, identity).await {
            warn!(user_id = identity.id, error = %e, "Failed to persist identity");
        }
    }

    async fn token_present(&self) -> bool {
        self.credentials
            .has(CredentialKey::AuthToken)
            .await
            .unwrap_or(false)
    }

    async fn remember_identifier(&self, identifier: &str, remember: Option<bool>) {
        let result = match remember {
            Some(true) => self
                .credentials
                .set(CredentialKey::RememberedUsername, identifier)
                .await,
            Some(false) => self
                .credentials
                .remove(CredentialKey::RememberedUsername)
                .await
                .map(|_| ()),
            None => Ok(()),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to update remembered username");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
