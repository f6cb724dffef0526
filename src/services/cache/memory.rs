use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::services::cache::client::{CacheClient, CacheResult};

/// Entries allowed before an insert sweeps expired keys.
const SWEEP_THRESHOLD: usize = 10_000;

/// In-process cache client.
///
/// Used when no Valkey URL is configured (single instance deployments, tests).
/// State is lost on restart and is not shared between instances.
#[derive(Clone, Debug, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

#[derive(Debug)]
struct Entry {
    // None: the TTL does not fit in an `Instant`, the key never expires.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|t| t > now)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys that have not expired yet.
    pub fn live_keys(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|e| e.is_live(now)).count()
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        _value: &str,
        ttl: Duration,
    ) -> CacheResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if entries.len() >= SWEEP_THRESHOLD {
            entries.retain(|_, e| e.is_live(now));
        }

        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                expires_at: now.checked_add(ttl),
            },
        );

        Ok(true)
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.remove(key).map_or(0, |_| 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_rejects_live_key() {
        let cache = MemoryCache::new();

        assert!(
            cache
                .set_if_absent_with_ttl("k", "1", Duration::from_secs(60))
                .await
                .unwrap()
        );
        assert!(
            !cache
                .set_if_absent_with_ttl("k", "1", Duration::from_secs(60))
                .await
                .unwrap()
        );
        assert_eq!(cache.live_keys(), 1);
    }

    #[tokio::test]
    async fn test_expired_key_can_be_set_again() {
        let cache = MemoryCache::new();

        assert!(
            cache
                .set_if_absent_with_ttl("k", "1", Duration::from_millis(10))
                .await
                .unwrap()
        );
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.live_keys(), 0);
        assert!(
            cache
                .set_if_absent_with_ttl("k", "1", Duration::from_secs(60))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_never_expires() {
        let cache = MemoryCache::new();

        assert!(
            cache
                .set_if_absent_with_ttl("k", "1", Duration::from_secs(u64::MAX))
                .await
                .unwrap()
        );
        assert!(
            !cache
                .set_if_absent_with_ttl("k", "1", Duration::from_secs(60))
                .await
                .unwrap()
        );
        assert_eq!(cache.live_keys(), 1);
    }

    #[tokio::test]
    async fn test_del_removes_key() {
        let cache = MemoryCache::new();
        cache
            .set_if_absent_with_ttl("k", "1", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.del("k").await.unwrap(), 1);
        assert_eq!(cache.del("k").await.unwrap(), 0);
        assert!(
            cache
                .set_if_absent_with_ttl("k", "1", Duration::from_secs(60))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let cache = MemoryCache::new();
        let other = cache.clone();

        cache
            .set_if_absent_with_ttl("k", "1", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(
            !other
                .set_if_absent_with_ttl("k", "1", Duration::from_secs(60))
                .await
                .unwrap()
        );
    }
}
