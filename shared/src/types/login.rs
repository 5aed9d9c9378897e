use serde::{Deserialize, Serialize};

use crate::types::identity::IdentitySummary;

// ---------------------------------------------------------------------------
// Login wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginData {
    #[serde(alias = "userName")]
    pub username: String,
    #[serde(alias = "passWord")]
    pub password: String,
}

/// Successful / failed login response envelope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginResponse {
    Success {
        user: IdentitySummary,
        /// Signed token; send it back as `Authorization: Bearer <token>` or `x-token`.
        token: String,
        /// Unix timestamp (seconds) at which `token` stops being accepted.
        expires_at: i64,
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Login errors
// ---------------------------------------------------------------------------

/// What the caller of the login endpoint is allowed to learn.
///
/// Unknown usernames and wrong passwords both become `InvalidCredentials`;
/// every session-store problem becomes `SessionUnavailable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    InvalidCredentials,
    MissingField(String),
    MalformedBody,
    SessionUnavailable,
    InternalError,
}

impl LoginError {
    pub fn to_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::MalformedBody => "MALFORMED_BODY",
            Self::SessionUnavailable => "SESSION_UNAVAILABLE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn to_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Invalid username or password".to_string(),
            Self::MissingField(field) => format!("Missing required field: {}", field),
            Self::MalformedBody => "Request body could not be parsed".to_string(),
            Self::SessionUnavailable => {
                "Login is temporarily unavailable, please retry".to_string()
            }
            Self::InternalError => "An internal error occurred".to_string(),
        }
    }

    pub fn to_response(&self) -> LoginResponse {
        LoginResponse::Error {
            code: self.to_code().to_string(),
            message: self.to_message(),
        }
    }
}
