use serde::{Deserialize, Serialize};

use crate::api::UserPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Invalidating,
}

/// Snapshot of who is logged in, persisted under the `user` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub email: String,
}

impl Identity {
    /// Build from a server user object. `identifier` is what the user typed
    /// at login and fills any gap the server left.
    pub fn from_payload(user: &UserPayload, identifier: &str) -> Self {
        let username = non_empty(user.username.as_deref()).unwrap_or(identifier).to_string();
        let email = non_empty(user.email.as_deref()).unwrap_or(identifier).to_string();
        let display_name = user
            .full_name()
            .or_else(|| non_empty(user.username.as_deref()).map(str::to_string))
            .or_else(|| non_empty(user.email.as_deref()).map(str::to_string))
            .unwrap_or_else(|| identifier.to_string());

        Self {
            id: user.id,
            username,
            display_name,
            email,
        }
    }

    /// Minimal identity for a login that returned only a session reference.
    pub fn minimal(user_id: i64, identifier: &str) -> Self {
        Self {
            id: user_id,
            username: identifier.to_string(),
            display_name: identifier.to_string(),
            email: identifier.to_string(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// The single process-wide authentication fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Session {
    pub state: SessionState,
    pub identity: Option<Identity>,
    pub credential_present: bool,
}

impl Session {
    pub fn unauthenticated() -> Self {
        Self {
            state: SessionState::Unauthenticated,
            identity: None,
            credential_present: false,
        }
    }

    pub fn authenticated(identity: Identity, credential_present: bool) -> Self {
        Self {
            state: SessionState::Authenticated,
            identity: Some(identity),
            credential_present,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    pub fn user_id(&self) -> Option<i64> {
        self.identity.as_ref().map(|i| i.id)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::unauthenticated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> UserPayload {
        UserPayload {
            id: 7,
            username: None,
            email: Some("alice@x.com".into()),
            first_name: None,
            last_name: None,
        }
    }

    #[test]
    fn test_identity_display_name_precedence() {
        let mut user = payload();
        assert_eq!(Identity::from_payload(&user, "alice").display_name, "alice@x.com");

        user.username = Some("alice_w".into());
        assert_eq!(Identity::from_payload(&user, "alice").display_name, "alice_w");

        user.first_name = Some("Alice".into());
        user.last_name = Some("Walker".into());
        let identity = Identity::from_payload(&user, "alice");
        assert_eq!(identity.display_name, "Alice Walker");
        assert_eq!(identity.username, "alice_w");
        assert_eq!(identity.email, "alice@x.com");
        assert_eq!(identity.id, 7);
    }

    #[test]
    fn test_identity_falls_back_to_login_identifier() {
        let user = UserPayload { email: Some("  ".into()), ..payload() };
        let identity = Identity::from_payload(&user, "alice@corp");
        assert_eq!(identity.email, "alice@corp");
        assert_eq!(identity.display_name, "alice@corp");
    }

    #[test]
    fn test_minimal_identity() {
        let identity = Identity::minimal(42, "bob");
        assert_eq!(identity.id, 42);
        assert_eq!(identity.display_name, "bob");
    }

    #[test]
    fn test_identity_survives_storage_roundtrip() {
        let identity = Identity::from_payload(&payload(), "alice");
        let raw = serde_json::to_string(&identity).unwrap();
        let back: Identity = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, identity);
    }

    #[test]
    fn test_default_session_is_unauthenticated() {
        let session = Session::default();
        assert_eq!(session.state, SessionState::Unauthenticated);
        assert!(session.identity.is_none());
        assert!(!session.is_authenticated());
        assert_eq!(session.user_id(), None);
    }
}
