//! Error taxonomy for token handling and the login / authorization flows.
//!
//! Every member stays distinguishable for logging and audit; the HTTP layer
//! collapses them into a handful of generic wire codes.

use hyper::StatusCode;
use thiserror::Error;

use crate::database::RepositoryError;
use crate::session::StoreError;

/// Why a presented token was rejected by the codec.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token has expired")]
    Expired,

    #[error("token is not valid yet")]
    NotYetValid,

    #[error("token cannot be verified with the configured key")]
    UnverifiableKey,

    #[error("token claims are invalid")]
    InvalidClaims,
}

impl TokenError {
    /// Stable name used in logs and audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::SignatureInvalid => "signature_invalid",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::UnverifiableKey => "unverifiable_key",
            Self::InvalidClaims => "invalid_claims",
        }
    }

    /// Failures that only a forged or corrupted token produces.
    pub fn suggests_tampering(&self) -> bool {
        matches!(self, Self::Malformed | Self::SignatureInvalid)
    }
}

/// Key material or claim problems while issuing a token.
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("no private key configured; this node can only verify tokens")]
    MissingPrivateKey,

    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {kind} key: {reason}")]
    InvalidKey { kind: &'static str, reason: String },

    #[error("claims rejected before signing: {0}")]
    InvalidClaims(&'static str),

    #[error("token encoding failed: {0}")]
    Encode(String),
}

/// Everything the session manager and the gate can fail with.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("no token presented")]
    MissingToken,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("token has been invalidated by a newer login")]
    Denylisted,

    #[error("session store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("could not invalidate the previous session: {0}")]
    SessionInvalidationFailed(#[source] StoreError),

    #[error("could not publish the new session: {0}")]
    SessionPublishFailed(#[source] StoreError),

    #[error("user repository unavailable: {0}")]
    RepositoryUnavailable(#[from] RepositoryError),

    #[error("authority {0} is not assigned to this user")]
    AuthorityNotAssigned(String),

    #[error("user {0} no longer exists")]
    UserNotFound(String),

    #[error(transparent)]
    Signing(#[from] SigningError),
}

impl AuthError {
    /// Stable name used in logs and audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::MissingToken => "missing_token",
            Self::Token(e) => e.as_str(),
            Self::Denylisted => "denylisted",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::SessionInvalidationFailed(_) => "session_invalidation_failed",
            Self::SessionPublishFailed(_) => "session_publish_failed",
            Self::RepositoryUnavailable(_) => "repository_unavailable",
            Self::AuthorityNotAssigned(_) => "authority_not_assigned",
            Self::UserNotFound(_) => "user_not_found",
            Self::Signing(_) => "signing_error",
        }
    }

    /// Whether this failure belongs to the gate (and therefore becomes the
    /// uniform 401).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::MissingToken | Self::Token(_) | Self::Denylisted | Self::StoreUnavailable(_)
        )
    }

    /// Wire code shown to the caller.
    pub fn public_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            e if e.is_rejection() => "UNAUTHORIZED",
            Self::SessionInvalidationFailed(_)
            | Self::SessionPublishFailed(_)
            | Self::RepositoryUnavailable(_) => "SESSION_UNAVAILABLE",
            Self::AuthorityNotAssigned(_) => "FORBIDDEN",
            Self::UserNotFound(_) => "NOT_FOUND",
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            e if e.is_rejection() => StatusCode::UNAUTHORIZED,
            Self::SessionInvalidationFailed(_)
            | Self::SessionPublishFailed(_)
            | Self::RepositoryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::AuthorityNotAssigned(_) => StatusCode::FORBIDDEN,
            Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
