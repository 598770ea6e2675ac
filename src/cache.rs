//! Component C6: a per-token cache of [`crate::client::UserClient`]s
//! (spec.md §4.6), keyed by the raw bearer token so distinct callers never
//! share a cluster identity.
//!
//! Grounded on the `moka::future::Cache` usage in the kubetail cluster-agent
//! authorizer (idle-expiry, `max_capacity`) extended with an eviction
//! listener so a client's `close` hook runs exactly once per entry, which
//! that reference does not need but spec.md §4.6 requires.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use moka::notification::RemovalCause;

use crate::client::UserClientFactory;
use crate::error::AuthError;

const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Caches one [`UserClientFactory::Client`] per bearer token, building it
/// lazily via the injected factory and evicting it after
/// `idle_timeout` of disuse.
pub struct ClientCache<F: UserClientFactory + 'static> {
    factory: Arc<F>,
    cache: Cache<String, Arc<F::Client>>,
}

impl<F: UserClientFactory + 'static> ClientCache<F> {
    pub fn new(factory: F, idle_timeout: Duration) -> Self {
        let factory = Arc::new(factory);
        let eviction_factory = factory.clone();
        let cache = Cache::builder()
            .max_capacity(DEFAULT_MAX_CAPACITY)
            .time_to_idle(idle_timeout)
            .eviction_listener(move |_key, client: Arc<F::Client>, cause| {
                // `close` is only meaningful semantics for an explicit
                // invalidate or an idle timeout, not for the cache simply
                // being dropped at process shutdown (`RemovalCause::Size`
                // shares the same "runs exactly once" requirement though,
                // since it represents the entry actually leaving the map).
                if !matches!(cause, RemovalCause::Replaced) {
                    eviction_factory.close(&client);
                }
            })
            .build();
        Self { factory, cache }
    }

    /// Get or build the client for `token`. Concurrent callers requesting
    /// the same token de-duplicate onto a single build (moka's native
    /// `get_with` behavior) rather than racing independent cluster-client
    /// constructions.
    pub async fn get_or_build(&self, token: &str) -> Result<Arc<F::Client>, AuthError> {
        let key = token.to_string();
        let factory = self.factory.clone();
        let token = token.to_string();
        self.cache
            .try_get_with(key, async move { factory.build(&token).await.map(Arc::new) })
            .await
            .map_err(|arc_err: Arc<AuthError>| (*arc_err).clone())
    }

    /// Evict `token`'s client immediately, e.g. after a cluster-client error
    /// on an access review (spec.md §4.3(e): invalidate before propagating).
    pub async fn invalidate(&self, token: &str) {
        self.cache.invalidate(token).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeClient(u32);

    struct FakeFactory {
        build_calls: AtomicUsize,
        close_calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl UserClientFactory for FakeFactory {
        type Client = FakeClient;

        async fn build(&self, _token: &str) -> Result<Self::Client, AuthError> {
            let n = self.build_calls.fetch_add(1, Ordering::SeqCst) as u32;
            if self.fail {
                Err(AuthError::ClusterClientError("boom".into()))
            } else {
                Ok(FakeClient(n))
            }
        }

        fn close(&self, _client: &Self::Client) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn reuses_client_for_same_token() {
        let close_calls = Arc::new(AtomicUsize::new(0));
        let factory = FakeFactory {
            build_calls: AtomicUsize::new(0),
            close_calls: close_calls.clone(),
            fail: false,
        };
        let cache = ClientCache::new(factory, Duration::from_secs(60));

        let a = cache.get_or_build("tok-1").await.unwrap();
        let b = cache.get_or_build("tok-1").await.unwrap();
        assert_eq!(a.0, b.0);
    }

    #[tokio::test]
    async fn distinct_tokens_get_distinct_clients() {
        let close_calls = Arc::new(AtomicUsize::new(0));
        let factory = FakeFactory {
            build_calls: AtomicUsize::new(0),
            close_calls,
            fail: false,
        };
        let cache = ClientCache::new(factory, Duration::from_secs(60));

        let a = cache.get_or_build("tok-1").await.unwrap();
        let b = cache.get_or_build("tok-2").await.unwrap();
        assert_ne!(a.0, b.0);
    }

    #[tokio::test]
    async fn invalidate_forces_rebuild() {
        let close_calls = Arc::new(AtomicUsize::new(0));
        let factory = FakeFactory {
            build_calls: AtomicUsize::new(0),
            close_calls: close_calls.clone(),
            fail: false,
        };
        let cache = ClientCache::new(factory, Duration::from_secs(60));

        let a = cache.get_or_build("tok-1").await.unwrap();
        cache.invalidate("tok-1").await;
        cache.cache.run_pending_tasks().await;
        let b = cache.get_or_build("tok-1").await.unwrap();
        assert_ne!(a.0, b.0);
        assert_eq!(close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn build_failure_is_not_cached() {
        let close_calls = Arc::new(AtomicUsize::new(0));
        let factory = FakeFactory {
            build_calls: AtomicUsize::new(0),
            close_calls,
            fail: true,
        };
        let cache = ClientCache::new(factory, Duration::from_secs(60));

        assert!(cache.get_or_build("tok-1").await.is_err());
        assert!(cache.get_or_build("tok-1").await.is_err());
        assert_eq!(cache.factory.build_calls.load(Ordering::SeqCst), 2);
    }
}
