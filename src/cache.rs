//! Ephemeral keyed storage with expiry.
//!
//! Single-process deployments can use the in-memory implementation; anything
//! horizontally scaled needs an external store behind the same trait. Payment
//! intents (order -> chosen method) are the current consumer.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Stores `value` under `key` for at most `ttl`.
    async fn put(&self, key: String, value: String, ttl: Duration);

    /// Returns the value if present and not expired.
    async fn get(&self, key: &str) -> Option<String>;

    /// Removes and returns the value if present and not expired.
    async fn take(&self, key: &str) -> Option<String>;
}

/// DashMap-backed store. Expired entries are dropped lazily on access.
#[derive(Default)]
pub struct InMemoryEphemeralStore {
    entries: DashMap<String, (String, Instant)>,
}

impl InMemoryEphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EphemeralStore for InMemoryEphemeralStore {
    async fn put(&self, key: String, value: String, ttl: Duration) {
        self.entries.insert(key, (value, Instant::now() + ttl));
    }

    async fn get(&self, key: &str) -> Option<String> {
        let (value, expired) = {
            let entry = self.entries.get(key)?;
            let (value, deadline) = entry.value();
            (value.clone(), *deadline <= Instant::now())
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        Some(value)
    }

    async fn take(&self, key: &str) -> Option<String> {
        let (_, (value, deadline)) = self.entries.remove(key)?;
        (deadline > Instant::now()).then_some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_take() {
        let store = InMemoryEphemeralStore::new();
        store
            .put("k".into(), "v".into(), Duration::from_secs(60))
            .await;

        assert_eq!(store.get("k").await.as_deref(), Some("v"));
        assert_eq!(store.take("k").await.as_deref(), Some("v"));
        assert_eq!(store.take("k").await, None);
    }

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let store = InMemoryEphemeralStore::new();
        store
            .put("k".into(), "v".into(), Duration::from_secs(0))
            .await;

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.get("k").await, None);
    }
}
