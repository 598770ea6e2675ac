//! Component C3: fanning a set of abstract [`ResourceAction`]s out into
//! concrete `SelfSubjectAccessReview`s, bounded by a deadline, reduced to a
//! single pass/fail (spec.md §4.3).

use std::time::Duration;

use futures::future::join_all;

use crate::cache::ClientCache;
use crate::client::{UserClient, UserClientFactory};
use crate::error::AuthError;
use crate::resource::{translate_verb, GroupResource, ResourceAction, ResourceMap};

/// Validate that `token` is allowed to perform every action in
/// `actions` against `namespace`, per the mapping in `resource_map`.
///
/// - An action whose `ResourceType` is absent from `resource_map` is
///   ungated: it contributes no probe and cannot cause denial (spec.md §3,
///   invariant 4).
/// - Every `GroupResource` a gated action maps to must independently come
///   back `allowed: true`. A `false` answer becomes
///   [`AuthError::PermissionDenied`] carrying the namespace, the resource's
///   canonical string, the verb, and the cluster's reason.
/// - The fan-out is bounded by `deadline`; exceeding it yields
///   [`AuthError::Timeout`].
/// - Any failure — denial, transport error, or timeout — invalidates the
///   token's cached client before propagating, so a future call rebuilds
///   fresh rather than reusing a client that just proved itself unreliable
///   or under-privileged (spec.md §4.3(6)).
pub async fn validate_token<F: UserClientFactory + 'static>(
    cache: &ClientCache<F>,
    namespace: &str,
    token: &str,
    actions: &[ResourceAction],
    resource_map: &ResourceMap,
    deadline: Duration,
) -> Result<bool, AuthError> {
    let probes = build_probes(actions, resource_map);
    if probes.is_empty() {
        // No gated action in the set (or no action at all): allowed by
        // policy, without ever obtaining a per-token client (spec.md §4.3,
        // tie-break: empty resourceActions never reaches C3).
        return Ok(true);
    }

    let client = match cache.get_or_build(token).await {
        Ok(client) => client,
        Err(err) => {
            cache.invalidate(token).await;
            return Err(err);
        }
    };

    let result = tokio::time::timeout(deadline, run_probes(client.as_ref(), namespace, &probes)).await;

    match result {
        Ok(Ok(())) => Ok(true),
        Ok(Err(err)) => {
            cache.invalidate(token).await;
            Err(err)
        }
        Err(_elapsed) => {
            cache.invalidate(token).await;
            Err(AuthError::Timeout)
        }
    }
}

/// A single `(verb, GroupResource)` pair to submit a review for.
struct Probe {
    verb: &'static str,
    group_resource: GroupResource,
}

fn build_probes(actions: &[ResourceAction], resource_map: &ResourceMap) -> Vec<Probe> {
    let mut probes = Vec::new();
    for action in actions {
        let verb = match translate_verb(action.verb) {
            Ok(v) => v,
            Err(_) => continue,
        };
        for group_resource in resource_map.iter_lookup(action.resource) {
            probes.push(Probe {
                verb,
                group_resource: group_resource.clone(),
            });
        }
    }
    probes
}

/// Submit every probe, wait for all of them, then report the first denial
/// or transport failure encountered in probe order. Every probe runs even
/// if an earlier one would already decide the outcome, matching the
/// "collect all, then decide" shape of spec.md §4.3 step 3/4 rather than
/// short-circuiting the fan-out.
async fn run_probes(
    client: &(impl UserClient + ?Sized),
    namespace: &str,
    probes: &[Probe],
) -> Result<(), AuthError> {
    let futures = probes
        .iter()
        .map(|probe| client.can_i(namespace, &probe.group_resource, probe.verb));
    let results = join_all(futures).await;

    for (probe, result) in probes.iter().zip(results) {
        let outcome = result?;
        if !outcome.allowed {
            return Err(AuthError::PermissionDenied {
                namespace: namespace.to_string(),
                group_resource: probe.group_resource.to_string(),
                verb: probe.verb.to_string(),
                reason: outcome.reason,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::AccessReviewOutcome;
    use crate::resource::{ResourceType, ResourceVerb};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeUserClient {
        allowed: bool,
        reason: String,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl UserClient for FakeUserClient {
        async fn can_i(
            &self,
            _namespace: &str,
            _group_resource: &GroupResource,
            _verb: &str,
        ) -> Result<AccessReviewOutcome, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccessReviewOutcome {
                allowed: self.allowed,
                reason: self.reason.clone(),
            })
        }
    }

    struct FakeFactory {
        allowed: bool,
        reason: String,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl UserClientFactory for FakeFactory {
        type Client = FakeUserClient;

        async fn build(&self, _token: &str) -> Result<Self::Client, AuthError> {
            if self.fail {
                Err(AuthError::ClusterClientError("no cluster".into()))
            } else {
                Ok(FakeUserClient {
                    allowed: self.allowed,
                    reason: self.reason.clone(),
                    calls: self.calls.clone(),
                })
            }
        }
    }

    fn map_with_one_resource() -> ResourceMap {
        ResourceMap::from_properties([("TARGET", "targets.cryostat.io")]).0
    }

    #[tokio::test]
    async fn empty_mapping_is_allowed_without_cluster_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ClientCache::new(
            FakeFactory {
                allowed: true,
                reason: String::new(),
                calls: calls.clone(),
                fail: false,
            },
            Duration::from_secs(60),
        );
        let map = ResourceMap::default();
        let actions = [ResourceAction::new(ResourceType::Target, ResourceVerb::Read)];
        let allowed = validate_token(&cache, "ns", "tok", &actions, &map, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(allowed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn gated_action_allowed_when_review_says_so() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ClientCache::new(
            FakeFactory {
                allowed: true,
                reason: String::new(),
                calls: calls.clone(),
                fail: false,
            },
            Duration::from_secs(60),
        );
        let map = map_with_one_resource();
        let actions = [ResourceAction::new(ResourceType::Target, ResourceVerb::Read)];
        let allowed = validate_token(&cache, "ns", "tok", &actions, &map, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(allowed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gated_action_denial_carries_reason_and_invalidates_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ClientCache::new(
            FakeFactory {
                allowed: false,
                reason: "insufficient role".to_string(),
                calls,
                fail: false,
            },
            Duration::from_secs(60),
        );
        let map = map_with_one_resource();
        let actions = [ResourceAction::new(ResourceType::Target, ResourceVerb::Read)];
        let err = validate_token(&cache, "ns", "tok", &actions, &map, Duration::from_secs(1))
            .await
            .unwrap_err();
        match err {
            AuthError::PermissionDenied {
                namespace,
                verb,
                reason,
                ..
            } => {
                assert_eq!(namespace, "ns");
                assert_eq!(verb, "get");
                assert_eq!(reason, "insufficient role");
            }
            other => panic!("expected PermissionDenied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_build_failure_invalidates_cache_entry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ClientCache::new(
            FakeFactory {
                allowed: true,
                reason: String::new(),
                calls,
                fail: true,
            },
            Duration::from_secs(60),
        );
        let map = map_with_one_resource();
        let actions = [ResourceAction::new(ResourceType::Target, ResourceVerb::Read)];
        let err = validate_token(&cache, "ns", "tok", &actions, &map, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ClusterClientError(_)));
    }
}
