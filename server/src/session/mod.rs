//! Session store abstraction.
//!
//! Two kinds of keys live in the store:
//!
//! * `<prefix>:session:<username>`: the user's current token (single-session
//!   mode only), with a TTL equal to the token's remaining lifetime.
//! * `<prefix>:denylist:<token>`: a marker for a token that was superseded
//!   before its natural expiry.  The marker never outlives the token.
//!
//! Callers only ever see [`Lookup`] and [`StoreError`]; the conventions of the
//! backing cache library stay inside the implementations.

pub mod memory;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemorySessionStore;
pub use redis_store::RedisSessionStore;

/// Result of a read that may legitimately find nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::NotFound => None,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Lookup::Found(v),
            None => Lookup::NotFound,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The token currently registered for `username`.
    async fn get_current_token(&self, username: &str) -> Result<Lookup<String>, StoreError>;

    /// Register `token` as the current one for `username`.  Overwrites
    /// unconditionally; last writer wins.
    async fn set_current_token(
        &self,
        username: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Mark `token` invalid for `ttl`.  Idempotent.
    async fn denylist(&self, token: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn is_denylisted(&self, token: &str) -> Result<bool, StoreError>;
}

pub(crate) fn session_key(prefix: &str, username: &str) -> String {
    format!("{}:session:{}", prefix, username)
}

pub(crate) fn denylist_key(prefix: &str, token: &str) -> String {
    format!("{}:denylist:{}", prefix, token)
}

/// Cache TTLs are whole seconds and must be positive.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
