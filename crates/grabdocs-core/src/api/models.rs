//! Wire types for the document service's JSON API.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::ApiError;

/// Ids arrive as numbers from most endpoints and as strings from a few.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    fn into_id<E: serde::de::Error>(self) -> Result<i64, E> {
        match self {
            RawId::Number(n) => Ok(n),
            RawId::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid id: {:?}", s))),
        }
    }

    fn into_text(self) -> String {
        match self {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    RawId::deserialize(deserializer)?.into_id()
}

fn de_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Option::<RawId>::deserialize(deserializer)?
        .map(RawId::into_id)
        .transpose()
}

fn de_opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(deserializer)?.map(RawId::into_text))
}

/// Common response envelope: `{success, message, data, user, token, session_info}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub user: Option<Value>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub session_info: Option<SessionInfo>,
}

impl Envelope {
    /// Decode `data` into `T`, treating a missing payload as malformed.
    pub fn decode_data<T: serde::de::DeserializeOwned>(&self, what: &str) -> Result<T, ApiError> {
        let data = match self.data {
            Some(ref value) if !value.is_null() => value.clone(),
            _ => return Err(ApiError::Malformed(format!("{} response carried no data", what))),
        };
        serde_json::from_value(data).map_err(|e| ApiError::Malformed(format!("{}: {}", what, e)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionInfo {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub user_id: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub session_id: Option<String>,
}

/// User object as the server sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPayload {
    #[serde(deserialize_with = "de_id")]
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl UserPayload {
    pub fn full_name(&self) -> Option<String> {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// The three shapes a successful login can take, decoded once here.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    /// Full user object in the response
    FullIdentity(UserPayload),
    /// Only a session reference; the profile has to be synthesized or fetched
    SessionReference {
        user_id: i64,
        session_id: Option<String>,
    },
    /// Success reported, but nothing to build an identity from
    Neither,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub outcome: LoginOutcome,
    pub token: Option<String>,
    pub message: Option<String>,
}

impl LoginResponse {
    pub fn from_envelope(envelope: Envelope) -> Result<Self, ApiError> {
        let user = envelope.user.filter(|v| !v.is_null());
        let outcome = match (user, envelope.session_info) {
            (Some(user), _) => {
                let payload: UserPayload = serde_json::from_value(user)
                    .map_err(|e| ApiError::Malformed(format!("login user: {}", e)))?;
                LoginOutcome::FullIdentity(payload)
            }
            (None, Some(SessionInfo { user_id: Some(user_id), session_id })) => {
                LoginOutcome::SessionReference { user_id, session_id }
            }
            (None, _) => LoginOutcome::Neither,
        };

        Ok(Self {
            outcome,
            token: envelope.token.filter(|t| !t.is_empty()),
            message: envelope.message,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl SignupRequest {
    /// Username defaults to the email; `name` is split into first/last.
    pub fn from_name(email: &str, password: &str, name: &str) -> Self {
        let mut parts = name.split_whitespace();
        let first_name = parts.next().map(str::to_string);
        let rest: Vec<&str> = parts.collect();
        let last_name = (!rest.is_empty()).then(|| rest.join(" "));
        Self {
            username: email.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            first_name,
            last_name,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.first_name.is_none() && self.last_name.is_none()
    }
}

/// Server-side record for an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    #[serde(deserialize_with = "de_id")]
    pub id: i64,
    #[serde(default)]
    pub original_filename: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub upload_date: Option<String>,
}
