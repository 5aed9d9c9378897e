use std::sync::Arc;

use hyper::Request;
use shared::types::Claims;
use tracing::{debug, warn};

use super::codec::TokenCodec;
use super::errors::AuthError;
use super::policy::SessionPolicy;
use crate::audit::{AuditEvent, AuditSink};
use crate::handlers::http::utils::headers::extract_token;

/// Identity attached to a request that passed the gate.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    /// The token as presented, needed when it has to be replaced.
    pub token: String,
}

/// Per-request token check.  Read-only with respect to session state.
pub struct AuthorizationGate {
    codec: Arc<TokenCodec>,
    policy: Arc<dyn SessionPolicy>,
    audit: Arc<dyn AuditSink>,
}

impl AuthorizationGate {
    pub fn new(
        codec: Arc<TokenCodec>,
        policy: Arc<dyn SessionPolicy>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            codec,
            policy,
            audit,
        }
    }

    /// Verify `token` and check it against the session policy.
    ///
    /// The returned error names the precise reason; callers must not pass
    /// it on to the client.
    pub async fn authorize(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = match self.codec.parse(token) {
            Ok(claims) => claims,
            Err(e) => {
                if e.suggests_tampering() {
                    warn!(reason = e.as_str(), "Rejected token: {}", e);
                } else {
                    debug!(reason = e.as_str(), "Rejected token: {}", e);
                }
                self.audit.record(AuditEvent::TokenRejected {
                    reason: e.as_str(),
                    username: None,
                });
                return Err(e.into());
            }
        };

        if let Err(e) = self.policy.admit(token).await {
            match &e {
                AuthError::StoreUnavailable(cause) => {
                    warn!(username = %claims.username, "Denylist check failed, rejecting: {}", cause)
                }
                _ => debug!(username = %claims.username, jti = %claims.jti, "Rejected token: {}", e),
            }
            self.audit.record(AuditEvent::TokenRejected {
                reason: e.as_str(),
                username: Some(claims.username.clone()),
            });
            return Err(e);
        }

        Ok(claims)
    }

    /// Authorize the token carried by `req` and attach an [`AuthContext`]
    /// to its extensions.
    pub async fn authorize_request<B>(&self, req: &mut Request<B>) -> Result<AuthContext, AuthError> {
        let Some(token) = extract_token(req.headers()) else {
            debug!("No token on {} {}", req.method(), req.uri().path());
            return Err(AuthError::MissingToken);
        };

        let claims = self.authorize(&token).await?;
        let context = AuthContext { claims, token };
        req.extensions_mut().insert(context.clone());
        Ok(context)
    }
}
