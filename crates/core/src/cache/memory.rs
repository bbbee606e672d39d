use crate::cache::EphemeralCache;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: tokio::sync::Mutex<HashMap<String, Entry>>,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl EphemeralCache for InMemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut guard = self.entries.lock().await;
        let Some(entry) = guard.get(key) else {
            return Ok(None);
        };
        if entry.expires_at <= Instant::now() {
            guard.remove(key);
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        let now = Instant::now();
        let expires_at = now + ttl;
        let mut guard = self.entries.lock().await;
        // Keys embed the collection date, so stale entries are rarely read again.
        guard.retain(|_, e| e.expires_at > now);
        guard.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn purge_expired(&self) -> anyhow::Result<u64> {
        let now = Instant::now();
        let mut guard = self.entries.lock().await;
        let before = guard.len();
        guard.retain(|_, e| e.expires_at > now);
        Ok((before - guard.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_value_until_expiry() {
        let cache = InMemoryCache::new();
        cache
            .set("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn zero_ttl_is_already_expired() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn purge_drops_only_expired_entries() {
        let cache = InMemoryCache::new();
        cache
            .set("fresh", "2", Duration::from_secs(60))
            .await
            .unwrap();
        cache.set("old", "1", Duration::ZERO).await.unwrap();
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.get("fresh").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn set_evicts_expired_entries_that_are_never_read() {
        let cache = InMemoryCache::new();
        cache.set("top_items-day1", "1", Duration::ZERO).await.unwrap();
        cache
            .set("top_items-day2", "2", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.entries.lock().await.len(), 1);
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn set_overwrites_existing_value() {
        let cache = InMemoryCache::new();
        cache.set("k", "a", Duration::from_secs(60)).await.unwrap();
        cache.set("k", "b", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("b"));
    }
}
