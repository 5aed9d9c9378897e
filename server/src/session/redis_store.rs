use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::{error, info, warn};

use super::{Lookup, SessionStore, StoreError, denylist_key, session_key, ttl_secs};

/// [`SessionStore`] backed by Redis.
///
/// Uses one multiplexed connection shared by every request task; each call
/// is bounded by `timeout` and a timeout is reported as
/// [`StoreError::Timeout`], never as a miss.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: MultiplexedConnection,
    prefix: String,
    timeout: Duration,
}

impl std::fmt::Debug for RedisSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSessionStore")
            .field("prefix", &self.prefix)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RedisSessionStore {
    /// Open a client for `url` and establish the multiplexed connection.
    pub async fn connect(
        url: &str,
        prefix: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| {
            error!("Invalid redis URL: {}", e);
            StoreError::Unavailable(e.to_string())
        })?;

        let conn = match tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                error!("Redis connection error: {}", e);
                return Err(StoreError::Unavailable(e.to_string()));
            }
            Err(_) => return Err(StoreError::Timeout(timeout)),
        };

        info!("Connected to redis session store");

        Ok(Self {
            conn,
            prefix: prefix.into(),
            timeout,
        })
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => {
                warn!("Redis {} failed: {}", op, e);
                Err(StoreError::Unavailable(e.to_string()))
            }
            Err(_) => {
                warn!("Redis {} timed out after {:?}", op, self.timeout);
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get_current_token(&self, username: &str) -> Result<Lookup<String>, StoreError> {
        let key = session_key(&self.prefix, username);
        let mut conn = self.conn.clone();
        let value: Option<String> = self.bounded("GET", conn.get(key)).await?;
        Ok(value.into())
    }

    async fn set_current_token(
        &self,
        username: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let key = session_key(&self.prefix, username);
        let mut conn = self.conn.clone();
        self.bounded::<(), _>("SETEX", conn.set_ex(key, token, ttl_secs(ttl)))
            .await
    }

    async fn denylist(&self, token: &str, ttl: Duration) -> Result<(), StoreError> {
        let key = denylist_key(&self.prefix, token);
        let mut conn = self.conn.clone();
        self.bounded::<(), _>("SETEX", conn.set_ex(key, 1u8, ttl_secs(ttl)))
            .await
    }

    async fn is_denylisted(&self, token: &str) -> Result<bool, StoreError> {
        let key = denylist_key(&self.prefix, token);
        let mut conn = self.conn.clone();
        self.bounded("EXISTS", conn.exists(key)).await
    }
}
