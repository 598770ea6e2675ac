//! The public façade (spec.md §6): wires C1 through C6 together behind the
//! handful of async methods a caller actually needs, without exposing any
//! cluster/cache/regex plumbing.

use crate::access;
use crate::cache::ClientCache;
use crate::client::{ServiceAccountClient, UserClientFactory};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::oauth::OAuthDiscovery;
use crate::resource::{ResourceAction, ResourceMap};
use crate::review::{self, UserInfo};
use crate::token;

/// The bearer-token authentication scheme this crate implements. Exposed as
/// a type rather than a string literal so callers building `WWW-Authenticate`
/// headers can match on it instead of comparing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer,
}

impl std::fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthScheme::Bearer => write!(f, "Bearer"),
        }
    }
}

/// The OpenShift-integrated authentication/authorization manager. One
/// instance per process; cheap to clone internally are its caches, not the
/// manager itself (spec.md §2, §6).
pub struct AuthManager<S, F>
where
    S: ServiceAccountClient,
    F: UserClientFactory + 'static,
{
    config: AuthConfig,
    service_account: S,
    client_cache: ClientCache<F>,
    resource_map: ResourceMap,
    oauth: OAuthDiscovery,
}

impl<S, F> AuthManager<S, F>
where
    S: ServiceAccountClient,
    F: UserClientFactory + 'static,
{
    pub fn new(
        config: AuthConfig,
        service_account: S,
        user_client_factory: F,
        resource_map: ResourceMap,
    ) -> Self {
        let client_cache = ClientCache::new(user_client_factory, config.client_cache_idle_timeout);
        let oauth = OAuthDiscovery::new(config.clone());
        Self {
            config,
            service_account,
            client_cache,
            resource_map,
            oauth,
        }
    }

    /// The authentication scheme this manager expects credentials in.
    pub fn get_scheme(&self) -> AuthScheme {
        AuthScheme::Bearer
    }

    /// Resolve the cluster-reported identity for a raw bearer token.
    pub async fn get_user_info(&self, token: &str) -> Result<UserInfo, AuthError> {
        review::user_info(&self.service_account, token).await
    }

    /// Validate that `token` authenticates and is allowed to perform every
    /// action in `actions` (spec.md §4.2 + §4.3, composed).
    pub async fn validate_token(
        &self,
        token: &str,
        actions: &[ResourceAction],
    ) -> Result<bool, AuthError> {
        review::review_token(&self.service_account, token).await?;
        access::validate_token(
            &self.client_cache,
            &self.config.namespace,
            token,
            actions,
            &self.resource_map,
            self.config.access_review_timeout,
        )
        .await
    }

    /// Extract a bearer token from an HTTP `Authorization` header and
    /// validate it against `actions` (spec.md §4.1 + §6).
    pub async fn validate_http_header(
        &self,
        header_value: Option<&str>,
        actions: &[ResourceAction],
    ) -> Result<bool, AuthError> {
        match token::extract_from_header(header_value) {
            Some(token) => self.validate_token(&token, actions).await,
            None => Ok(false),
        }
    }

    /// Extract a bearer token from a WebSocket subprotocol string and
    /// validate it against `actions` (spec.md §4.1 + §6).
    pub async fn validate_web_socket_sub_protocol(
        &self,
        subprotocol: Option<&str>,
        actions: &[ResourceAction],
    ) -> Result<bool, AuthError> {
        match token::extract_from_subprotocol(subprotocol) {
            Some(token) => self.validate_token(&token, actions).await,
            None => Ok(false),
        }
    }

    /// The URL a caller should be redirected to in order to log in, or an
    /// empty string if `token` is already valid for `actions` (spec.md
    /// §4.5).
    pub async fn get_login_redirect_url(
        &self,
        token: &str,
        actions: &[ResourceAction],
    ) -> Result<String, AuthError> {
        let validation = self.validate_token(token, actions).await;
        self.oauth
            .get_login_redirect_url(&self.service_account, &validation)
            .await
    }

    /// Extract the bearer token from an HTTP `Authorization` header, revoke
    /// it, drop its cached client, and return the URL the caller should be
    /// redirected to afterward (spec.md §6 `logout(headerProvider) →
    /// optional<string>`). A header carrying no token is a no-op that
    /// returns an empty string — there is nothing to revoke.
    pub async fn logout(&self, header_value: Option<&str>) -> Result<String, AuthError> {
        let Some(token) = token::extract_from_header(header_value) else {
            return Ok(String::new());
        };
        self.oauth.logout(&self.service_account, &token).await?;
        self.client_cache.invalidate(&token).await;
        self.oauth.get_logout_redirect_url(&self.service_account).await
    }
}

/// Build the default timeout/cache parameters for an [`AuthManager`] from
/// the pod's own namespace, inferring cluster credentials in the process
/// (spec.md §2). Convenience constructor over [`AuthManager::new`] for the
/// common in-cluster case.
pub async fn from_in_cluster_config(
    namespace: impl Into<String>,
) -> Result<
    AuthManager<crate::client::KubeServiceAccountClient, crate::client::KubeUserClientFactory>,
    AuthError,
> {
    let namespace = namespace.into();
    let service_account = crate::client::KubeServiceAccountClient::infer().await?;
    let base_config = kube::Config::infer()
        .await
        .map_err(|e| AuthError::ClusterClientError(e.to_string()))?;
    let user_client_factory = crate::client::KubeUserClientFactory::new(base_config);
    let resource_map = default_resource_map();
    let config = AuthConfig::new(namespace);
    Ok(AuthManager::new(
        config,
        service_account,
        user_client_factory,
        resource_map,
    ))
}

fn default_resource_map() -> ResourceMap {
    ResourceMap::from_properties(std::iter::empty::<(&str, &str)>()).0
}
