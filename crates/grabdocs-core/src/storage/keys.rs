//! Storage key enumeration.
//!
//! Every key the app has ever written lives here, including the ones older
//! releases used. `clear_all` walks this set so a logout on a new build still
//! removes what an old build left behind.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    /// Serialized identity snapshot (JSON)
    User,
    /// Bearer credential
    AuthToken,
    /// Server session id from `session_info`
    SessionId,
    /// Identifier kept for pre-filling the login form ("remember me")
    RememberedUsername,
    /// Legacy identity snapshot
    UserData,
    /// Legacy auth blob
    Authentication,
    /// Legacy login payload
    LoginData,
    /// Legacy persisted auth-store state
    AuthStorage,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 8] = [
        CredentialKey::User,
        CredentialKey::AuthToken,
        CredentialKey::SessionId,
        CredentialKey::RememberedUsername,
        CredentialKey::UserData,
        CredentialKey::Authentication,
        CredentialKey::LoginData,
        CredentialKey::AuthStorage,
    ];

    /// Keys removed on logout and forced reset. The remembered username
    /// survives so the login form can be pre-filled.
    pub const SESSION_KEYS: [CredentialKey; 7] = [
        CredentialKey::User,
        CredentialKey::AuthToken,
        CredentialKey::SessionId,
        CredentialKey::UserData,
        CredentialKey::Authentication,
        CredentialKey::LoginData,
        CredentialKey::AuthStorage,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            CredentialKey::User => "user",
            CredentialKey::AuthToken => "auth_token",
            CredentialKey::SessionId => "session_id",
            CredentialKey::RememberedUsername => "remembered_username",
            CredentialKey::UserData => "user_data",
            CredentialKey::Authentication => "authentication",
            CredentialKey::LoginData => "login_data",
            CredentialKey::AuthStorage => "auth-storage",
        }
    }

    /// Whether current code still writes this key.
    pub const fn is_legacy(self) -> bool {
        matches!(
            self,
            CredentialKey::UserData
                | CredentialKey::Authentication
                | CredentialKey::LoginData
                | CredentialKey::AuthStorage
        )
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
