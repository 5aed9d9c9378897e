use std::time::Duration;

use shared::types::Claims;
use shared::types::server_config::AuthConfig;
use uuid::Uuid;

use crate::database::Identity;
use crate::database::utils::get_timestamp;

/// Builds the claim set for a freshly authenticated identity.
///
/// Holds only immutable configuration, so one instance is shared by every
/// request task.
#[derive(Debug, Clone)]
pub struct ClaimsBuilder {
    ttl: Duration,
    issuer: String,
    audience: String,
    not_before_skew: Duration,
}

impl ClaimsBuilder {
    pub fn new(ttl: Duration, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            ttl,
            issuer: issuer.into(),
            audience: audience.into(),
            not_before_skew: Duration::ZERO,
        }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(auth.token_ttl(), auth.issuer.clone(), auth.audience.clone())
            .with_not_before_skew(Duration::from_secs(auth.not_before_skew_secs))
    }

    pub fn with_not_before_skew(mut self, skew: Duration) -> Self {
        self.not_before_skew = skew;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn build(&self, identity: &Identity) -> Claims {
        self.build_at(identity, get_timestamp())
    }

    /// `build` with an explicit clock reading.
    pub fn build_at(&self, identity: &Identity, now: i64) -> Claims {
        Claims {
            uuid: identity.uuid,
            id: identity.id,
            nick_name: identity.nick_name.clone(),
            username: identity.username.clone(),
            authority_id: identity.authority_id.clone(),
            iss: self.issuer.clone(),
            sub: identity.username.clone(),
            aud: self.audience.clone(),
            iat: now,
            nbf: now - self.not_before_skew.as_secs() as i64,
            exp: now + self.ttl.as_secs() as i64,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Claims for a token replacing `current` after an authority switch.
    ///
    /// Identity fields and `exp` carry over so the switch never extends the
    /// session; `iat`, `nbf` and `jti` are fresh.
    pub fn rebuild_with_authority(&self, current: &Claims, authority_id: &str, now: i64) -> Claims {
        Claims {
            authority_id: authority_id.to_string(),
            iat: now,
            nbf: now - self.not_before_skew.as_secs() as i64,
            jti: Uuid::new_v4().to_string(),
            ..current.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity {
            id: 7,
            uuid: Uuid::new_v4(),
            username: "alice".into(),
            nick_name: "Alice".into(),
            password_hash: "unused".into(),
            authority_id: "888".into(),
            authority_ids: vec!["888".into(), "9528".into()],
        }
    }

    #[test]
    fn expiry_is_now_plus_ttl() {
        let builder = ClaimsBuilder::new(Duration::from_secs(3600), "iss", "aud");
        let claims = builder.build_at(&alice(), 1_000);
        assert_eq!(claims.iat, 1_000);
        assert_eq!(claims.exp, 4_600);
        assert!(claims.exp > claims.iat);
        assert_eq!(claims.nbf, 1_000);
    }

    #[test]
    fn identity_fields_are_copied() {
        let id = alice();
        let claims = ClaimsBuilder::new(Duration::from_secs(60), "iss", "aud").build_at(&id, 0);
        assert_eq!(claims.uuid, id.uuid);
        assert_eq!(claims.id, 7);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.nick_name, "Alice");
        assert_eq!(claims.authority_id, "888");
        assert_eq!(claims.iss, "iss");
        assert_eq!(claims.aud, "aud");
    }

    #[test]
    fn not_before_is_back_dated_by_skew() {
        let builder = ClaimsBuilder::new(Duration::from_secs(60), "iss", "aud")
            .with_not_before_skew(Duration::from_secs(30));
        let claims = builder.build_at(&alice(), 1_000);
        assert_eq!(claims.nbf, 970);
    }

    #[test]
    fn every_build_gets_a_fresh_token_id() {
        let builder = ClaimsBuilder::new(Duration::from_secs(60), "iss", "aud");
        let id = alice();
        assert_ne!(builder.build_at(&id, 0).jti, builder.build_at(&id, 0).jti);
    }

    #[test]
    fn authority_switch_keeps_expiry() {
        let builder = ClaimsBuilder::new(Duration::from_secs(3600), "iss", "aud");
        let original = builder.build_at(&alice(), 1_000);
        let switched = builder.rebuild_with_authority(&original, "9528", 2_000);

        assert_eq!(switched.authority_id, "9528");
        assert_eq!(switched.exp, original.exp);
        assert_eq!(switched.iat, 2_000);
        assert_eq!(switched.username, original.username);
        assert_ne!(switched.jti, original.jti);
    }
}
