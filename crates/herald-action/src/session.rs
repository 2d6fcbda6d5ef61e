//! Pending batch sessions.
//!
//! A batch waits here between being staged and being confirmed. Taking a
//! batch removes it, so a session is executed at most once even when
//! confirmations race.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use herald_core::types::Timestamp;
use tokio::time::Instant;
use tracing::debug;

use crate::error::SessionError;
use crate::types::{Batch, SessionKey};

/// Key-value store with TTL holding staged batches.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store `batch` under `key`, replacing any earlier batch, expiring after `ttl`.
    async fn put(&self, key: SessionKey, batch: Batch, ttl: Duration)
        -> Result<(), SessionError>;

    /// Remove and return the batch. A second call after a successful take,
    /// or a call after expiry, returns `NotFound`.
    async fn take(&self, key: &SessionKey) -> Result<Batch, SessionError>;

    /// Push the expiry of a live session to `ttl` from now.
    async fn extend(&self, key: &SessionKey, ttl: Duration) -> Result<(), SessionError>;

    /// Drop every expired session and return how many were removed.
    async fn purge_expired(&self) -> Result<usize, SessionError>;
}

struct Entry {
    batch: Batch,
    deadline: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// In-memory session store guarded by a single lock.
pub struct InMemorySessionStore {
    entries: Mutex<HashMap<SessionKey, Entry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored sessions, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(
        &self,
        key: SessionKey,
        mut batch: Batch,
        ttl: Duration,
    ) -> Result<(), SessionError> {
        let now = Instant::now();
        batch.expires_at = Timestamp::now().plus(ttl);
        let entry = Entry {
            batch,
            deadline: now + ttl,
        };
        let mut entries = self.entries.lock().map_err(SessionError::poisoned)?;
        // Abandoned sessions go on the next write.
        let before = entries.len();
        entries.retain(|_, pending| !pending.is_expired(now));
        if entries.len() < before {
            debug!(evicted = before - entries.len(), "Evicted expired sessions");
        }
        if entries.insert(key.clone(), entry).is_some() {
            debug!(session = %key, "Replaced pending session");
        }
        Ok(())
    }

    async fn take(&self, key: &SessionKey) -> Result<Batch, SessionError> {
        let mut entries = self.entries.lock().map_err(SessionError::poisoned)?;
        match entries.remove(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => Ok(entry.batch),
            Some(_) => {
                debug!(session = %key, "Session expired before it was taken");
                Err(SessionError::NotFound(key.clone()))
            }
            None => Err(SessionError::NotFound(key.clone())),
        }
    }

    async fn extend(&self, key: &SessionKey, ttl: Duration) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().map_err(SessionError::poisoned)?;
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.deadline = now + ttl;
                entry.batch.expires_at = Timestamp::now().plus(ttl);
                Ok(())
            }
            _ => Err(SessionError::NotFound(key.clone())),
        }
    }

    async fn purge_expired(&self) -> Result<usize, SessionError> {
        let mut entries = self.entries.lock().map_err(SessionError::poisoned)?;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::types::TenantId;
    use std::sync::Arc;

    fn batch(lines: &[&str]) -> Batch {
        Batch::from_lines(TenantId::new("guild-1"), lines.iter().copied())
    }

    #[tokio::test]
    async fn test_put_and_take() {
        let store = InMemorySessionStore::new();
        let key = SessionKey::new("alice", "chan");
        store
            .put(key.clone(), batch(&["ban_member x"]), Duration::from_secs(300))
            .await
            .unwrap();

        let taken = store.take(&key).await.unwrap();
        assert_eq!(taken.len(), 1);
        assert!(taken.expires_at >= taken.created_at);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_take_is_destructive() {
        let store = InMemorySessionStore::new();
        let key = SessionKey::new("alice", "chan");
        store
            .put(key.clone(), batch(&["ban_member x"]), Duration::from_secs(300))
            .await
            .unwrap();

        assert!(store.take(&key).await.is_ok());
        let err = store.take(&key).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_take_absent_key() {
        let store = InMemorySessionStore::new();
        let err = store.take(&SessionKey::new("nobody", "nowhere")).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_after_expiry() {
        let store = InMemorySessionStore::new();
        let key = SessionKey::new("alice", "chan");
        store
            .put(key.clone(), batch(&["ban_member x"]), Duration::from_secs(300))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(matches!(
            store.take(&key).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_keeps_session_alive() {
        let store = InMemorySessionStore::new();
        let key = SessionKey::new("alice", "chan");
        store
            .put(key.clone(), batch(&["ban_member x"]), Duration::from_secs(300))
            .await
            .unwrap();
        store.extend(&key, Duration::from_secs(900)).await.unwrap();

        tokio::time::advance(Duration::from_secs(600)).await;
        assert!(store.take(&key).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_expired_session_fails() {
        let store = InMemorySessionStore::new();
        let key = SessionKey::new("alice", "chan");
        store
            .put(key.clone(), batch(&["ban_member x"]), Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.extend(&key, Duration::from_secs(900)).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = InMemorySessionStore::new();
        store
            .put(SessionKey::new("a", "c"), batch(&["ban_member x"]), Duration::from_secs(10))
            .await
            .unwrap();
        store
            .put(SessionKey::new("b", "c"), batch(&["ban_member y"]), Duration::from_secs(100))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_evicts_abandoned_sessions() {
        let store = InMemorySessionStore::new();
        store
            .put(SessionKey::new("a", "c"), batch(&["ban_member x"]), Duration::from_secs(10))
            .await
            .unwrap();
        store
            .put(SessionKey::new("b", "c"), batch(&["ban_member y"]), Duration::from_secs(100))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        store
            .put(SessionKey::new("d", "c"), batch(&["kick_member z"]), Duration::from_secs(100))
            .await
            .unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.take(&SessionKey::new("b", "c")).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_take_is_at_most_once() {
        for _ in 0..50 {
            let store = Arc::new(InMemorySessionStore::new());
            let key = SessionKey::new("alice", "chan");
            store
                .put(key.clone(), batch(&["ban_member x"]), Duration::from_secs(300))
                .await
                .unwrap();

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let key = key.clone();
                    tokio::spawn(async move { store.take(&key).await })
                })
                .collect();

            let mut found = 0;
            let mut missing = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => found += 1,
                    Err(SessionError::NotFound(_)) => missing += 1,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            assert_eq!((found, missing), (1, 1));
        }
    }
}
