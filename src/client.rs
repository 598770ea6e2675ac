//! The cluster collaborators this crate talks to, expressed as traits so
//! [`crate::review`], [`crate::access`], and [`crate::oauth`] can be tested
//! against hand-written fakes instead of a live cluster.
//!
//! Two roles, matching spec.md §2's two distinct cluster identities:
//! - the pod's own service account, used for `TokenReview` and OAuth
//!   housekeeping (deleting an `OAuthAccessToken` on logout);
//! - a per-caller client impersonating the bearer token under review, used
//!   for `SelfSubjectAccessReview` (spec.md §4.3) — the review must run as
//!   the caller, not as the pod, or it would always answer for the wrong
//!   identity.

use k8s_openapi::api::authentication::v1::{TokenReview, TokenReviewSpec, TokenReviewStatus};
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use kube::api::PostParams;
use kube::config::AuthInfo;
use kube::{Api, Client, Config};

use crate::error::AuthError;
use crate::resource::GroupResource;

/// The pod's own service-account-backed view of the cluster: token review
/// and OAuth access token housekeeping (spec.md §4.2, §4.5).
#[async_trait::async_trait]
pub trait ServiceAccountClient: Send + Sync {
    /// Submit a `TokenReview` for `token` and return its status.
    async fn review_token(&self, token: &str) -> Result<TokenReviewStatus, AuthError>;

    /// Delete the `OAuthAccessToken` object named `name`. Returns `Ok(true)`
    /// if an object was deleted, `Ok(false)` if none existed by that name.
    async fn delete_oauth_access_token(&self, name: &str) -> Result<bool, AuthError>;

    /// Fetch the OAuth server metadata document from
    /// `{masterUrl}/.well-known/oauth-authorization-server`.
    async fn fetch_oauth_metadata(&self) -> Result<serde_json::Value, AuthError>;
}

/// The outcome of one `SelfSubjectAccessReview`: whether it was allowed,
/// and the cluster-supplied reason when it was not (spec.md §4.3(4),
/// carried into [`AuthError::PermissionDenied`]).
#[derive(Debug, Clone, Default)]
pub struct AccessReviewOutcome {
    pub allowed: bool,
    pub reason: String,
}

/// A client scoped to one caller's bearer token, used to submit
/// `SelfSubjectAccessReview`s as that caller (spec.md §4.3).
#[async_trait::async_trait]
pub trait UserClient: Send + Sync {
    /// Submit a `SelfSubjectAccessReview` for `(namespace, group_resource,
    /// verb)` and return its outcome.
    async fn can_i(
        &self,
        namespace: &str,
        group_resource: &GroupResource,
        verb: &str,
    ) -> Result<AccessReviewOutcome, AuthError>;
}

/// Builds a [`UserClient`] bound to a specific bearer token. Implemented by
/// [`KubeUserClientFactory`] and injected into [`crate::cache::ClientCache`]
/// as its loader.
#[async_trait::async_trait]
pub trait UserClientFactory: Send + Sync {
    type Client: UserClient + 'static;

    async fn build(&self, token: &str) -> Result<Self::Client, AuthError>;

    /// Called once, from the cache's eviction listener, when a client falls
    /// out of the cache (spec.md §4.6). The default is a no-op; `kube`
    /// clients hold no resources that need explicit release, but the hook
    /// exists for symmetry with collaborators (e.g. a pooled connection)
    /// that do.
    fn close(&self, _client: &Self::Client) {}
}

/// `kube`-backed [`ServiceAccountClient`], constructed from the pod's own
/// in-cluster service account credentials.
pub struct KubeServiceAccountClient {
    client: Client,
    master_url: String,
}

impl KubeServiceAccountClient {
    pub async fn infer() -> Result<Self, AuthError> {
        let config = Config::infer()
            .await
            .map_err(|e| AuthError::ClusterClientError(e.to_string()))?;
        let master_url = config.cluster_url.to_string();
        let client = Client::try_from(config)?;
        Ok(Self { client, master_url })
    }

    /// Build directly from an already-constructed `kube::Client` and the
    /// cluster's master URL, bypassing in-cluster config discovery. Used by
    /// tests that point a `kube::Client` at a local mock server.
    pub fn from_parts(client: Client, master_url: impl Into<String>) -> Self {
        Self {
            client,
            master_url: master_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl ServiceAccountClient for KubeServiceAccountClient {
    async fn review_token(&self, token: &str) -> Result<TokenReviewStatus, AuthError> {
        let reviews: Api<TokenReview> = Api::all(self.client.clone());
        let review = TokenReview {
            spec: TokenReviewSpec {
                token: Some(token.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let response = reviews.create(&PostParams::default(), &review).await?;
        response
            .status
            .ok_or_else(|| AuthError::AuthorizationError("TokenReview returned no status".into()))
    }

    async fn delete_oauth_access_token(&self, name: &str) -> Result<bool, AuthError> {
        let path = format!("/apis/oauth.openshift.io/v1/oauthaccesstokens/{name}");
        let request = http::Request::delete(path)
            .body(Vec::new())
            .map_err(|e| AuthError::ClusterClientError(e.to_string()))?;
        match self.client.request_text(request).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(false),
            Err(err) => Err(AuthError::ClusterClientError(err.to_string())),
        }
    }

    async fn fetch_oauth_metadata(&self) -> Result<serde_json::Value, AuthError> {
        let url = format!("{}/.well-known/oauth-authorization-server", self.master_url);
        let request = http::Request::get(url)
            .header("Accept", "application/json")
            .body(Vec::new())
            .map_err(|e| AuthError::ClusterClientError(e.to_string()))?;
        let body = self
            .client
            .request_text(request)
            .await
            .map_err(|e| AuthError::ClusterClientError(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| AuthError::ClusterClientError(e.to_string()))
    }
}

/// A `kube` client impersonating one caller's bearer token.
pub struct KubeUserClient {
    client: Client,
}

#[async_trait::async_trait]
impl UserClient for KubeUserClient {
    async fn can_i(
        &self,
        namespace: &str,
        group_resource: &GroupResource,
        verb: &str,
    ) -> Result<AccessReviewOutcome, AuthError> {
        let reviews: Api<SelfSubjectAccessReview> = Api::all(self.client.clone());
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    namespace: Some(namespace.to_string()),
                    group: Some(group_resource.group.clone()),
                    resource: Some(group_resource.resource.clone()),
                    subresource: Some(group_resource.sub_resource.clone()),
                    verb: Some(verb.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        let response = reviews.create(&PostParams::default(), &review).await?;
        let status = response.status.unwrap_or_default();
        Ok(AccessReviewOutcome {
            allowed: status.allowed,
            reason: status.reason.unwrap_or_default(),
        })
    }
}

/// Builds [`KubeUserClient`]s bound to a given bearer token, by cloning the
/// pod's base `kube::Config` and overriding its `AuthInfo` (the same
/// technique used for gRPC log-streaming authorization in sibling systems).
pub struct KubeUserClientFactory {
    base_config: Config,
}

impl KubeUserClientFactory {
    pub fn new(base_config: Config) -> Self {
        Self { base_config }
    }
}

#[async_trait::async_trait]
impl UserClientFactory for KubeUserClientFactory {
    type Client = KubeUserClient;

    async fn build(&self, token: &str) -> Result<Self::Client, AuthError> {
        let mut config = self.base_config.clone();
        config.auth_info = AuthInfo {
            token: Some(token.to_string().into()),
            ..Default::default()
        };
        let client = Client::try_from(config)?;
        Ok(KubeUserClient { client })
    }
}
