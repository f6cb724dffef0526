use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use crate::services::{
    auth::replay::store::{ReplayError, ReplayStore},
    cache::{CacheClient, MemoryCache, ValkeyClient},
};

/// Cache-backed replay store (Valkey or in-process).
///
/// Fail-closed policy is implemented by returning `Err` on any backend error;
/// callers treat that as a proof validation failure.
#[derive(Clone)]
pub struct CacheReplayStore<C: CacheClient> {
    cache: Arc<C>,
    // Key prefix to avoid collisions across environments
    prefix: String,
}

impl CacheReplayStore<ValkeyClient> {
    pub async fn connect(valkey_url: &str) -> Result<Self, ReplayError> {
        // Any backend failure is surfaced as ReplayError (fail-closed).
        let client = ValkeyClient::new(valkey_url).await?;
        Ok(Self::new_with_cache(Arc::new(client), "dpop:replay"))
    }
}

impl CacheReplayStore<MemoryCache> {
    pub fn in_memory() -> Self {
        Self::new_with_cache(Arc::new(MemoryCache::new()), "dpop:replay")
    }
}

impl<C: CacheClient> CacheReplayStore<C> {
    pub fn new_with_cache(cache: Arc<C>, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.cache.backend_name()
    }

    // Both parts are attacker controlled; hash them into a fixed-size key.
    pub fn key(&self, jti: &str, resource: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(resource.as_bytes());
        hasher.update([0u8]);
        hasher.update(jti.as_bytes());
        format!("{}:{}", self.prefix, URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }
}

impl<C: CacheClient> ReplayStore for CacheReplayStore<C> {
    fn check_and_record<'a>(
        &'a self,
        jti: &'a str,
        resource: &'a str,
        ttl_secs: u64,
    ) -> Pin<Box<dyn Future<Output = Result<bool, ReplayError>> + Send + 'a>> {
        Box::pin(async move {
            let key = self.key(jti, resource);

            // SET <key> "1" NX EX <ttl>
            let first_time = self
                .cache
                .set_if_absent_with_ttl(&key, "1", Duration::from_secs(ttl_secs))
                .await?;

            Ok(first_time)
        })
    }

    fn release<'a>(
        &'a self,
        jti: &'a str,
        resource: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ReplayError>> + Send + 'a>> {
        Box::pin(async move {
            let key = self.key(jti, resource);
            self.cache.del(&key).await?;
            Ok(())
        })
    }
}
