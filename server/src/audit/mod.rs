//! Security audit trail.
//!
//! Records the specific reason behind every login failure and token
//! rejection, which the HTTP layer deliberately hides from callers.

use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    LoginSucceeded {
        username: String,
        jti: String,
        /// A previous session was invalidated by this login.
        superseded: bool,
    },
    LoginFailed {
        username: String,
        reason: &'static str,
    },
    TokenRejected {
        reason: &'static str,
        /// Known only when the token parsed.
        username: Option<String>,
    },
    AuthorityChanged {
        username: String,
        from: String,
        to: String,
        jti: String,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LoginSucceeded { .. } => "login_succeeded",
            Self::LoginFailed { .. } => "login_failed",
            Self::TokenRejected { .. } => "token_rejected",
            Self::AuthorityChanged { .. } => "authority_changed",
        }
    }
}

/// Destination for audit events.  Implementations must not block.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes audit events to the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match event {
            AuditEvent::LoginSucceeded {
                username,
                jti,
                superseded,
            } => info!(target: "audit", %username, %jti, superseded, "login succeeded"),
            AuditEvent::LoginFailed { username, reason } => {
                warn!(target: "audit", %username, reason, "login failed")
            }
            AuditEvent::TokenRejected { reason, username } => match username {
                Some(username) => warn!(target: "audit", %username, reason, "token rejected"),
                None => warn!(target: "audit", reason, "token rejected"),
            },
            AuditEvent::AuthorityChanged {
                username,
                from,
                to,
                jti,
            } => info!(target: "audit", %username, %from, %to, %jti, "authority changed"),
        }
    }
}
