//! User persistence.
//!
//! The auth core only reads identities and switches a user's current
//! authority; everything goes through [`UserRepository`] so the core never
//! sees SQL.

pub mod create;
pub mod users;
pub mod utils;

use std::time::Duration;

use async_trait::async_trait;
use shared::types::IdentitySummary;
use thiserror::Error;
use uuid::Uuid;

pub use create::create_tables;
pub use users::SqliteUserRepository;

/// A user record as stored by the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub uuid: Uuid,
    pub username: String,
    pub nick_name: String,
    pub password_hash: String,
    /// Authority currently in effect.
    pub authority_id: String,
    /// Every authority the user may switch to, including the current one.
    pub authority_ids: Vec<String>,
}

impl Identity {
    pub fn has_authority(&self, authority_id: &str) -> bool {
        self.authority_id == authority_id || self.authority_ids.iter().any(|a| a == authority_id)
    }

    /// The part of the record that may be shown to the caller.
    pub fn summary(&self) -> IdentitySummary {
        IdentitySummary {
            id: self.id,
            uuid: self.uuid,
            username: self.username.clone(),
            nick_name: self.nick_name.clone(),
            authority_id: self.authority_id.clone(),
            authority_ids: self.authority_ids.clone(),
        }
    }
}

/// Outcome of a credential check.  Callers outside the auth core only ever
/// learn whether it was `Verified`.
#[derive(Debug, Clone)]
pub enum CredentialCheck {
    Verified(Identity),
    UnknownUser,
    WrongPassword,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub nick_name: String,
    pub authority_id: String,
    /// Additional authorities beyond `authority_id`.
    pub extra_authorities: Vec<String>,
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("repository call timed out after {0:?}")]
    Timeout(Duration),

    #[error("corrupt user record: {0}")]
    Corrupt(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("user {0} not found")]
    NotFound(String),

    #[error("invalid user data: {0}")]
    Invalid(String),

    #[error("user {0} already exists")]
    Conflict(String),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<CredentialCheck, RepositoryError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, RepositoryError>;

    /// Make `authority_id` the user's current authority.  The caller checks
    /// that it is one of the user's assigned authorities.
    async fn set_user_authority(
        &self,
        user_id: i64,
        authority_id: &str,
    ) -> Result<(), RepositoryError>;

    async fn create_user(&self, user: NewUser) -> Result<Identity, RepositoryError>;
}
