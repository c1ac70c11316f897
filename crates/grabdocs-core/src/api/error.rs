use thiserror::Error;

/// Transport-level failures, collapsed into the categories callers branch on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Unable to reach the server: {0}")]
    Connectivity(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Server error ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// No response reached us
    Connectivity,
    /// Server says the caller is not authenticated
    Authorization,
    /// Server responded with failure semantics
    Rejection,
    /// Response could not be decoded
    Malformed,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

const UNAUTHORIZED_MESSAGE: &str = "Not authenticated - session may be expired";

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut cut = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
    }

    /// Build an error for a non-success HTTP status. `message` is the
    /// server-provided message when the body carried one.
    pub fn from_status(status: u16, message: Option<String>, body: &str) -> Self {
        match status {
            401 => ApiError::Unauthorized(message.unwrap_or_else(|| UNAUTHORIZED_MESSAGE.to_string())),
            _ => {
                let message = message.unwrap_or_else(|| match body.trim() {
                    "" => default_status_message(status).to_string(),
                    text => Self::truncate_body(text),
                });
                ApiError::Rejected { status, message }
            }
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Connectivity(_) => ErrorCategory::Connectivity,
            ApiError::Unauthorized(_) => ErrorCategory::Authorization,
            ApiError::Rejected { .. } => ErrorCategory::Rejection,
            ApiError::Malformed(_) => ErrorCategory::Malformed,
        }
    }

    pub fn is_authorization_loss(&self) -> bool {
        self.category() == ErrorCategory::Authorization
    }

    /// Text suitable for showing to the user, preferring the server's wording.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Connectivity(_) => {
                "Unable to reach the server. Please check your connection.".to_string()
            }
            ApiError::Unauthorized(message) => message.clone(),
            ApiError::Rejected { message, .. } => message.clone(),
            ApiError::Malformed(_) => "The server sent an unexpected response.".to_string(),
        }
    }
}

fn default_status_message(status: u16) -> &'static str {
    match status {
        403 => "Access denied",
        404 => "Resource not found",
        413 => "File too large",
        429 => "Rate limited - please wait before retrying",
        500..=599 => "Server error occurred. Please try again later.",
        _ => "Request failed",
    }
}
