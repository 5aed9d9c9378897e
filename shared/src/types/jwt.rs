use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims embedded in every token issued by the server.
///
/// The first block identifies the user and is what protected handlers read
/// (role checks, audit).  The second block holds the registered claims that
/// the codec validates on every request.
///
/// A `Claims` value is built fresh on each login and never changed after it
/// has been signed; an authority switch produces a new value with a new `jti`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Stable user UUID (matches `sys_users.uuid`).
    pub uuid: Uuid,

    /// Numeric user ID (matches `sys_users.id`).
    pub id: i64,

    pub nick_name: String,

    pub username: String,

    /// Current authority (role) the token grants.
    pub authority_id: String,

    pub iss: String,

    /// Standard JWT subject, always the username.
    pub sub: String,

    pub aud: String,

    /// Issued-at (Unix timestamp, seconds).
    pub iat: i64,

    /// Not-before (Unix timestamp, seconds).  Back-dated from `iat` by the
    /// configured skew.
    pub nbf: i64,

    /// Expiry (Unix timestamp, seconds).  Always greater than `iat`.
    pub exp: i64,

    /// Unique token ID.
    pub jti: String,
}

impl Claims {
    /// Seconds left before `exp`, clamped at zero.
    pub fn remaining_secs(&self, now: i64) -> u64 {
        (self.exp - now).max(0) as u64
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }
}
