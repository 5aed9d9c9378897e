use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Lookup, SessionStore, StoreError, denylist_key, session_key};

/// Single-process TTL map implementing [`SessionStore`].
///
/// Meant for development and for deployments with exactly one server
/// instance; state is lost on restart and is not shared between processes.
#[derive(Clone, Debug)]
pub struct InMemorySessionStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    entries: RwLock<HashMap<String, Entry>>,
    prefix: String,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

impl InMemorySessionStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: RwLock::new(HashMap::new()),
                prefix: prefix.into(),
            }),
        }
    }

    async fn put(&self, key: String, value: String, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.inner
            .entries
            .write()
            .await
            .insert(key, Entry { value, expires_at });
    }

    async fn get_live(&self, key: &str) -> Option<String> {
        let entries = self.inner.entries.read().await;
        entries
            .get(key)
            .filter(|e| e.is_live(Instant::now()))
            .map(|e| e.value.clone())
    }

    /// Drop entries whose TTL has passed.  Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.inner.entries.write().await;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, e| e.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Purged {} expired session entries", removed);
        }
        removed
    }

    /// Number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_current_token(&self, username: &str) -> Result<Lookup<String>, StoreError> {
        let key = session_key(&self.inner.prefix, username);
        Ok(self.get_live(&key).await.into())
    }

    async fn set_current_token(
        &self,
        username: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let key = session_key(&self.inner.prefix, username);
        self.put(key, token.to_string(), ttl).await;
        Ok(())
    }

    async fn denylist(&self, token: &str, ttl: Duration) -> Result<(), StoreError> {
        let key = denylist_key(&self.inner.prefix, token);
        self.put(key, "1".to_string(), ttl).await;
        Ok(())
    }

    async fn is_denylisted(&self, token: &str) -> Result<bool, StoreError> {
        let key = denylist_key(&self.inner.prefix, token);
        Ok(self.get_live(&key).await.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn current_token_is_overwritten() {
        let store = InMemorySessionStore::new("t");
        assert_eq!(
            store.get_current_token("alice").await.unwrap(),
            Lookup::NotFound
        );

        store
            .set_current_token("alice", "one", Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set_current_token("alice", "two", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            store.get_current_token("alice").await.unwrap(),
            Lookup::Found("two".to_string())
        );
    }

    #[tokio::test]
    async fn denylisting_twice_is_harmless() {
        let store = InMemorySessionStore::new("t");
        store.denylist("tok", Duration::from_secs(60)).await.unwrap();
        store.denylist("tok", Duration::from_secs(60)).await.unwrap();

        assert!(store.is_denylisted("tok").await.unwrap());
        assert!(!store.is_denylisted("other").await.unwrap());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn entries_expire_with_their_ttl() {
        let store = InMemorySessionStore::new("t");
        store
            .denylist("short", Duration::from_millis(20))
            .await
            .unwrap();
        store
            .set_current_token("bob", "tok", Duration::from_millis(20))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!store.is_denylisted("short").await.unwrap());
        assert_eq!(store.get_current_token("bob").await.unwrap(), Lookup::NotFound);
        assert_eq!(store.purge_expired().await, 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn usernames_do_not_collide_with_tokens() {
        let store = InMemorySessionStore::new("t");
        store
            .set_current_token("same", "x", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!store.is_denylisted("same").await.unwrap());
    }
}
