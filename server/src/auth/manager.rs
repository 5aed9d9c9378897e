use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use shared::types::{Claims, IdentitySummary};
use tracing::{debug, error, info, warn};

use super::claims::ClaimsBuilder;
use super::codec::{IssuedToken, TokenCodec};
use super::errors::AuthError;
use super::policy::SessionPolicy;
use crate::audit::{AuditEvent, AuditSink};
use crate::database::utils::get_timestamp;
use crate::database::{CredentialCheck, RepositoryError, UserRepository};

/// What a successful login hands back to the caller.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub expires_at: i64,
    pub identity: IdentitySummary,
}

/// Orchestrates login and token re-issue.
///
/// Holds no per-user state of its own; everything that must be shared
/// between requests or nodes lives behind the session policy's store.
pub struct AuthSessionManager {
    users: Arc<dyn UserRepository>,
    builder: ClaimsBuilder,
    codec: Arc<TokenCodec>,
    policy: Arc<dyn SessionPolicy>,
    audit: Arc<dyn AuditSink>,
    repo_timeout: Duration,
}

impl AuthSessionManager {
    pub fn new(
        users: Arc<dyn UserRepository>,
        builder: ClaimsBuilder,
        codec: Arc<TokenCodec>,
        policy: Arc<dyn SessionPolicy>,
        audit: Arc<dyn AuditSink>,
        repo_timeout: Duration,
    ) -> Self {
        Self {
            users,
            builder,
            codec,
            policy,
            audit,
            repo_timeout,
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        match tokio::time::timeout(self.repo_timeout, fut).await {
            Ok(result) => result.map_err(AuthError::from),
            Err(_) => Err(RepositoryError::Timeout(self.repo_timeout).into()),
        }
    }

    /// Authenticate and open a session.
    ///
    /// Unknown users and wrong passwords both fail with
    /// [`AuthError::InvalidCredentials`]; the audit record keeps the
    /// difference.  A store failure while replacing the previous session
    /// aborts the login and no token is returned.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let check = match self
            .bounded(self.users.find_by_credentials(username, password))
            .await
        {
            Ok(check) => check,
            Err(e) => {
                self.login_failed(username, &e);
                return Err(e);
            }
        };

        let identity = match check {
            CredentialCheck::Verified(identity) => identity,
            CredentialCheck::UnknownUser => {
                self.audit.record(AuditEvent::LoginFailed {
                    username: username.to_string(),
                    reason: "unknown_user",
                });
                return Err(AuthError::InvalidCredentials);
            }
            CredentialCheck::WrongPassword => {
                self.audit.record(AuditEvent::LoginFailed {
                    username: username.to_string(),
                    reason: "wrong_password",
                });
                return Err(AuthError::InvalidCredentials);
            }
        };

        let issued = self
            .codec
            .issue(self.builder.build(&identity))
            .map_err(|e| {
                let e = AuthError::from(e);
                self.login_failed(username, &e);
                e
            })?;

        let superseded = match self.policy.establish(&identity.username, &issued).await {
            Ok(superseded) => superseded,
            Err(e) => {
                self.login_failed(username, &e);
                return Err(e);
            }
        };

        info!(
            username = %identity.username,
            jti = %issued.claims.jti,
            policy = self.policy.name(),
            "Login succeeded"
        );
        self.audit.record(AuditEvent::LoginSucceeded {
            username: identity.username.clone(),
            jti: issued.claims.jti.clone(),
            superseded,
        });

        Ok(LoginOutcome {
            expires_at: issued.expires_at(),
            token: issued.token,
            identity: identity.summary(),
        })
    }

    fn login_failed(&self, username: &str, e: &AuthError) {
        warn!(%username, reason = e.as_str(), "Login failed: {}", e);
        self.audit.record(AuditEvent::LoginFailed {
            username: username.to_string(),
            reason: e.as_str(),
        });
    }

    pub async fn user_info(&self, username: &str) -> Result<IdentitySummary, AuthError> {
        self.bounded(self.users.find_by_username(username))
            .await?
            .map(|identity| identity.summary())
            .ok_or_else(|| AuthError::UserNotFound(username.to_string()))
    }

    /// Switch the caller's current authority and issue a replacement token.
    ///
    /// The new token keeps the expiry of `current`, so switching never
    /// extends a session.  It is established through the session policy
    /// exactly like a login, which denylists the presented token in
    /// single-session mode.  If that fails the stored authority is put back,
    /// so the repository keeps matching the token the caller still holds.
    pub async fn reissue_with_authority(
        &self,
        current: &Claims,
        authority_id: &str,
    ) -> Result<IssuedToken, AuthError> {
        let identity = self
            .bounded(self.users.find_by_username(&current.username))
            .await?
            .ok_or_else(|| AuthError::UserNotFound(current.username.clone()))?;

        if !identity.has_authority(authority_id) {
            debug!(
                username = %identity.username,
                authority_id,
                "Requested authority not assigned"
            );
            return Err(AuthError::AuthorityNotAssigned(authority_id.to_string()));
        }

        let claims = self
            .builder
            .rebuild_with_authority(current, authority_id, get_timestamp());
        let issued = self.codec.issue(claims)?;

        self.bounded(self.users.set_user_authority(identity.id, authority_id))
            .await?;
        if let Err(e) = self.policy.establish(&identity.username, &issued).await {
            self.restore_authority(&identity.username, identity.id, &identity.authority_id)
                .await;
            return Err(e);
        }

        info!(
            username = %identity.username,
            from = %current.authority_id,
            to = authority_id,
            "Authority switched; token re-issued"
        );
        self.audit.record(AuditEvent::AuthorityChanged {
            username: identity.username,
            from: current.authority_id.clone(),
            to: authority_id.to_string(),
            jti: issued.claims.jti.clone(),
        });

        Ok(issued)
    }

    /// Undo a persisted authority switch whose token never went live.
    async fn restore_authority(&self, username: &str, user_id: i64, previous: &str) {
        match self
            .bounded(self.users.set_user_authority(user_id, previous))
            .await
        {
            Ok(()) => debug!(%username, authority_id = previous, "Authority switch rolled back"),
            Err(e) => error!(
                %username,
                authority_id = previous,
                "Could not roll back authority switch: {}", e
            ),
        }
    }
}
