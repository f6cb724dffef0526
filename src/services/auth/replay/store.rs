use std::{future::Future, pin::Pin, sync::Arc};

use tracing::{debug, warn};

use crate::services::cache::CacheError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Replay cache for DPoP proof identifiers.
///
/// Entries are keyed by `(jti, resource)` where `resource` is the normalized
/// `htu` the proof was presented to.
pub trait ReplayStore: Send + Sync {
    // Atomically check whether `(jti, resource)` was already seen and record it with TTL.
    //
    // Returns:
    // - Ok(true)  => first time (stored successfully)
    // - Ok(false) => replay detected (already exists)
    // - Err(_)    => backend failure (caller must fail closed)
    fn check_and_record<'a>(
        &'a self,
        jti: &'a str,
        resource: &'a str,
        ttl_secs: u64,
    ) -> BoxFuture<'a, Result<bool, ReplayError>>;

    // Forget a previously recorded `(jti, resource)`.
    //
    // Used when the request that recorded it failed for an unrelated reason,
    // so a retry of the same proof is not rejected as a replay.
    fn release<'a>(&'a self, jti: &'a str, resource: &'a str)
    -> BoxFuture<'a, Result<(), ReplayError>>;
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// A recorded `(jti, resource)` whose request has not finished yet.
///
/// Call [`ReplayReservation::commit`] once the token response exists, or
/// [`ReplayReservation::release`] when the request fails. Dropping an
/// uncommitted reservation (e.g. the request future was cancelled) releases
/// it in the background on the current Tokio runtime.
#[must_use = "an uncommitted reservation is released when dropped"]
pub struct ReplayReservation {
    store: Arc<dyn ReplayStore>,
    jti: String,
    resource: String,
    armed: bool,
}

impl std::fmt::Debug for ReplayReservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayReservation")
            .field("resource", &self.resource)
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

impl ReplayReservation {
    pub(crate) fn new(store: Arc<dyn ReplayStore>, jti: &str, resource: &str) -> Self {
        Self {
            store,
            jti: jti.to_string(),
            resource: resource.to_string(),
            armed: true,
        }
    }

    /// Keep the record until its TTL expires.
    pub fn commit(mut self) {
        self.armed = false;
    }

    /// Remove the record now.
    pub async fn release(mut self) {
        self.armed = false;
        if let Err(e) = self.store.release(&self.jti, &self.resource).await {
            warn!(error = %e, resource = %self.resource, "failed to release DPoP replay record");
        }
    }
}

impl Drop for ReplayReservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(resource = %self.resource, "no runtime to release DPoP replay record");
            return;
        };

        let store = Arc::clone(&self.store);
        let jti = std::mem::take(&mut self.jti);
        let resource = std::mem::take(&mut self.resource);

        debug!(resource = %resource, "releasing DPoP replay record of abandoned request");
        handle.spawn(async move {
            if let Err(e) = store.release(&jti, &resource).await {
                warn!(error = %e, resource = %resource, "failed to release DPoP replay record");
            }
        });
    }
}
