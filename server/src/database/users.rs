use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::utils::{get_timestamp, hash_password, is_valid_username, sanitize_string, verify_password};
use super::{CredentialCheck, Identity, NewUser, RepositoryError, UserRepository, create_tables};

/// Verified against when the username does not exist, so an unknown user
/// costs the same Argon2 work as a wrong password.
static DUMMY_HASH: OnceLock<String> = OnceLock::new();

fn dummy_hash() -> &'static str {
    DUMMY_HASH.get_or_init(|| {
        hash_password(&Uuid::new_v4().to_string()).unwrap_or_else(|e| {
            warn!("Could not prepare dummy password hash: {}", e);
            String::new()
        })
    })
}

/// [`UserRepository`] over a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and make sure the
    /// schema exists.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let pool = if url.contains(":memory:") {
            // Each connection to an in-memory database is its own database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(url)
                .await?
        } else {
            let options = SqliteConnectOptions::from_str(url)?
                .create_if_missing(true)
                .foreign_keys(true);
            SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect_with(options)
                .await?
        };

        create_tables(&pool).await?;
        dummy_hash();
        info!("User database ready at {}", url);

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn authorities_of(&self, user_id: i64) -> Result<Vec<String>, RepositoryError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT authority_id FROM sys_user_authority WHERE user_id = ?1 ORDER BY authority_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn load(&self, username: &str) -> Result<Option<Identity>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, uuid, username, nick_name, password_hash, authority_id
             FROM sys_users WHERE username = ?1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut identity = identity_from_row(&row)?;
        identity.authority_ids = self.authorities_of(identity.id).await?;
        Ok(Some(identity))
    }
}

fn identity_from_row(row: &SqliteRow) -> Result<Identity, RepositoryError> {
    let raw_uuid: String = row.try_get("uuid")?;
    let uuid = Uuid::parse_str(&raw_uuid)
        .map_err(|e| RepositoryError::Corrupt(format!("bad uuid {}: {}", raw_uuid, e)))?;

    Ok(Identity {
        id: row.try_get("id")?,
        uuid,
        username: row.try_get("username")?,
        nick_name: row.try_get("nick_name")?,
        password_hash: row.try_get("password_hash")?,
        authority_id: row.try_get("authority_id")?,
        authority_ids: Vec::new(),
    })
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn find_by_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<CredentialCheck, RepositoryError> {
        let Some(identity) = self.load(username).await? else {
            let _ = verify_password(dummy_hash(), password);
            return Ok(CredentialCheck::UnknownUser);
        };

        if verify_password(&identity.password_hash, password)? {
            Ok(CredentialCheck::Verified(identity))
        } else {
            Ok(CredentialCheck::WrongPassword)
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, RepositoryError> {
        self.load(username).await
    }

    async fn set_user_authority(
        &self,
        user_id: i64,
        authority_id: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE sys_users SET authority_id = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(authority_id)
        .bind(get_timestamp())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(user_id.to_string()));
        }

        debug!("User {} switched to authority {}", user_id, authority_id);
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<Identity, RepositoryError> {
        let username = sanitize_string(&user.username);
        if !is_valid_username(&username) {
            return Err(RepositoryError::Invalid(format!(
                "username {:?} must be 3-64 chars of letters, digits, '_', '-' or '.'",
                username
            )));
        }
        if user.password.is_empty() {
            return Err(RepositoryError::Invalid("password is empty".to_string()));
        }
        if user.authority_id.is_empty() {
            return Err(RepositoryError::Invalid("authority is empty".to_string()));
        }

        let password_hash = hash_password(&user.password)?;
        let uuid = Uuid::new_v4();
        let now = get_timestamp();

        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM sys_users WHERE username = ?1")
            .bind(&username)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_some() {
            return Err(RepositoryError::Conflict(username));
        }

        let id = sqlx::query(
            "INSERT INTO sys_users (uuid, username, password_hash, nick_name, authority_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        )
        .bind(uuid.to_string())
        .bind(&username)
        .bind(&password_hash)
        .bind(&user.nick_name)
        .bind(&user.authority_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let mut authority_ids = vec![user.authority_id.clone()];
        for extra in user.extra_authorities {
            if !extra.is_empty() && !authority_ids.contains(&extra) {
                authority_ids.push(extra);
            }
        }

        for authority in &authority_ids {
            sqlx::query("INSERT INTO sys_user_authority (user_id, authority_id) VALUES (?1, ?2)")
                .bind(id)
                .bind(authority)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!("Created user {} (id {})", username, id);

        authority_ids.sort();
        Ok(Identity {
            id,
            uuid,
            username,
            nick_name: user.nick_name,
            password_hash,
            authority_id: user.authority_id,
            authority_ids,
        })
    }
}
