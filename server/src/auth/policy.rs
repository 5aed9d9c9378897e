//! Session policies.
//!
//! Chosen once at startup from `auth.use_multipoint`.  The stateless policy
//! trusts every correctly signed token until it expires; the single-session
//! policy keeps one current token per user and denylists the one it replaces.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::codec::{IssuedToken, TokenCodec};
use super::errors::AuthError;
use crate::database::utils::get_timestamp;
use crate::session::{Lookup, SessionStore};

#[async_trait]
pub trait SessionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Make `issued` the current session of `username`.
    ///
    /// Returns `true` when a previous session was invalidated.  On error the
    /// new token must not be handed out.
    async fn establish(&self, username: &str, issued: &IssuedToken) -> Result<bool, AuthError>;

    /// Decide whether an already verified token may still be used.
    async fn admit(&self, token: &str) -> Result<(), AuthError>;
}

/// Every valid token is accepted until `exp`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatelessPolicy;

#[async_trait]
impl SessionPolicy for StatelessPolicy {
    fn name(&self) -> &'static str {
        "stateless"
    }

    async fn establish(&self, _username: &str, _issued: &IssuedToken) -> Result<bool, AuthError> {
        Ok(false)
    }

    async fn admit(&self, _token: &str) -> Result<(), AuthError> {
        Ok(())
    }
}

/// At most one non-denylisted token per user.
///
/// Login order is read current, denylist it, then publish the new one.  The
/// denylist write must succeed before the new token is published so a
/// failure never leaves two live sessions.  Two concurrent logins for the
/// same user both pass the read before either publishes; the later publish
/// wins and the earlier token stays valid until it expires.
pub struct SingleSessionPolicy {
    store: Arc<dyn SessionStore>,
    codec: Arc<TokenCodec>,
    /// Denylist TTL for a prior token whose expiry cannot be read.
    fallback_ttl: Duration,
}

impl SingleSessionPolicy {
    pub fn new(store: Arc<dyn SessionStore>, codec: Arc<TokenCodec>, fallback_ttl: Duration) -> Self {
        Self {
            store,
            codec,
            fallback_ttl,
        }
    }

    /// How long `prior` could still be presented, or `None` if it is
    /// already dead.  Includes the codec's leeway, since the gate keeps
    /// accepting a token that long past `exp`.
    fn remaining_lifetime(&self, prior: &str, now: i64) -> Option<Duration> {
        match self.codec.parse_ignoring_lifetime(prior) {
            Ok(claims) => self.accepted_for(claims.exp, now),
            Err(e) => {
                // Signed under an old key or otherwise unreadable: keep it
                // denylisted for a full token lifetime.
                debug!("Prior session token unreadable ({}); using fallback TTL", e.as_str());
                Some(self.fallback_ttl + self.codec.leeway())
            }
        }
    }

    /// Time left until a token expiring at `exp` is refused by the codec.
    fn accepted_for(&self, exp: i64, now: i64) -> Option<Duration> {
        let last_accepted = exp.saturating_add(self.codec.leeway().as_secs() as i64);
        (last_accepted > now).then(|| Duration::from_secs((last_accepted - now) as u64))
    }
}

#[async_trait]
impl SessionPolicy for SingleSessionPolicy {
    fn name(&self) -> &'static str {
        "single_session"
    }

    async fn establish(&self, username: &str, issued: &IssuedToken) -> Result<bool, AuthError> {
        let now = get_timestamp();

        let prior = self
            .store
            .get_current_token(username)
            .await
            .map_err(|e| {
                warn!(%username, "Could not read current session: {}", e);
                AuthError::SessionInvalidationFailed(e)
            })?;

        let mut superseded = false;
        if let Lookup::Found(prior) = prior {
            if let Some(ttl) = self.remaining_lifetime(&prior, now) {
                self.store.denylist(&prior, ttl).await.map_err(|e| {
                    warn!(%username, "Could not denylist previous session: {}", e);
                    AuthError::SessionInvalidationFailed(e)
                })?;
                superseded = true;
                info!(%username, ttl_secs = ttl.as_secs(), "Previous session denylisted");
            }
        }

        let ttl = self
            .accepted_for(issued.claims.exp, now)
            .unwrap_or(Duration::from_secs(1));
        self.store
            .set_current_token(username, &issued.token, ttl)
            .await
            .map_err(|e| {
                warn!(%username, jti = %issued.claims.jti, "Could not publish new session: {}", e);
                AuthError::SessionPublishFailed(e)
            })?;

        Ok(superseded)
    }

    async fn admit(&self, token: &str) -> Result<(), AuthError> {
        match self.store.is_denylisted(token).await {
            Ok(false) => Ok(()),
            Ok(true) => Err(AuthError::Denylisted),
            Err(e) => Err(AuthError::StoreUnavailable(e)),
        }
    }
}
