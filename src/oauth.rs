//! Component C5: OAuth discovery and the three derived URLs/operations
//! Cryostat's login flow needs — the authorization redirect, the logout
//! redirect, and access-token revocation (spec.md §4.5).
//!
//! The three discovery-derived values (`authorization_endpoint`, the
//! logout URL, and the raw metadata document itself) are each memoized
//! permanently, including failures: once the metadata fetch fails once, it
//! is never retried for the lifetime of this `OAuthDiscovery` (spec.md §3,
//! invariant 5; §9 open question 1). `moka::future::Cache::get_with` (not
//! `try_get_with`) is what gives us that semantics — `try_get_with` retries
//! the loader on every `Err`, which is the one thing the source does not
//! do here.

use std::env;
use std::sync::Arc;

use moka::future::Cache;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::client::ServiceAccountClient;
use crate::config::AuthConfig;
use crate::error::AuthError;

/// The fields of the `.well-known/oauth-authorization-server` document this
/// crate actually consumes; everything else in the document is ignored
/// (spec.md §4.5).
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
}

/// One of the three permanently-memoized discovery slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Metadata,
    AuthorizationUrl,
    LogoutUrl,
}

/// Discovers and caches OAuth server metadata, and derives the
/// authorization/logout URLs and access-token-revocation behavior from it.
pub struct OAuthDiscovery {
    config: AuthConfig,
    cache: Cache<Slot, Arc<Result<String, AuthError>>>,
    metadata_cache: Cache<Slot, Arc<Result<OAuthMetadata, AuthError>>>,
}

impl OAuthDiscovery {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            cache: Cache::builder().max_capacity(8).build(),
            metadata_cache: Cache::builder().max_capacity(8).build(),
        }
    }

    async fn metadata(
        &self,
        service_account: &dyn ServiceAccountClient,
    ) -> Result<OAuthMetadata, AuthError> {
        let result = self
            .metadata_cache
            .get_with(Slot::Metadata, async move {
                let result = service_account.fetch_oauth_metadata().await.and_then(|value| {
                    serde_json::from_value(value)
                        .map_err(|e| AuthError::ClusterClientError(e.to_string()))
                });
                Arc::new(result)
            })
            .await;
        (*result).clone()
    }

    async fn authorization_endpoint(
        &self,
        service_account: &dyn ServiceAccountClient,
    ) -> Result<String, AuthError> {
        let result = self
            .cache
            .get_with(Slot::AuthorizationUrl, async move {
                let metadata = self.metadata(service_account).await;
                let result =
                    metadata.and_then(|m| self.build_authorization_url(&m.authorization_endpoint));
                Arc::new(result)
            })
            .await;
        (*result).clone()
    }

    async fn logout_endpoint(
        &self,
        service_account: &dyn ServiceAccountClient,
    ) -> Result<String, AuthError> {
        let result = self
            .cache
            .get_with(Slot::LogoutUrl, async move {
                let metadata = self.metadata(service_account).await;
                let result = metadata.map(|m| format!("{}/logout", m.issuer));
                Arc::new(result)
            })
            .await;
        (*result).clone()
    }

    fn build_authorization_url(&self, authorization_endpoint: &str) -> Result<String, AuthError> {
        let client_id_suffix = env::var(&self.config.oauth_client_id_env).map_err(|_| {
            AuthError::MissingEnvironmentVariable(self.config.oauth_client_id_env.clone())
        })?;
        let role = env::var(&self.config.oauth_role_env)
            .map_err(|_| AuthError::MissingEnvironmentVariable(self.config.oauth_role_env.clone()))?;

        let client_id = format!(
            "system:serviceaccount:{}:{}",
            self.config.namespace, client_id_suffix
        );
        let scope = format!("user:check-access role:{}:{}", role, self.config.namespace);

        let url = url::Url::parse_with_params(
            authorization_endpoint,
            &[
                ("client_id", client_id.as_str()),
                ("response_type", "token"),
                ("response_mode", "fragment"),
                ("scope", scope.as_str()),
            ],
        )
        .map_err(|e| AuthError::ClusterClientError(e.to_string()))?;
        Ok(url.to_string())
    }

    /// The redirect-to-login URL a caller should be sent to, given the
    /// outcome of a prior `validateToken` call.
    ///
    /// An already-authorized caller (`token_validation` is `Ok(true)`) needs
    /// no redirect, so this returns an empty string. A failure that
    /// [`AuthError::should_redirect_to_login`] recognizes resolves to the
    /// memoized authorization URL instead of propagating; anything else
    /// propagates unchanged (spec.md §4.5).
    pub async fn get_login_redirect_url(
        &self,
        service_account: &dyn ServiceAccountClient,
        token_validation: &Result<bool, AuthError>,
    ) -> Result<String, AuthError> {
        match token_validation {
            Ok(true) => Ok(String::new()),
            Ok(false) => self.authorization_endpoint(service_account).await,
            Err(err) if err.should_redirect_to_login() => {
                self.authorization_endpoint(service_account).await
            }
            Err(err) => Err(err.clone()),
        }
    }

    /// The logout redirect URL, derived from the discovered issuer.
    pub async fn get_logout_redirect_url(
        &self,
        service_account: &dyn ServiceAccountClient,
    ) -> Result<String, AuthError> {
        self.logout_endpoint(service_account).await
    }

    /// Revoke `token` by deleting its backing `OAuthAccessToken` object.
    ///
    /// The object's name is derived from the token per OpenShift's scheme:
    /// strip a leading `sha256~` prefix if present, SHA-256 hash the
    /// remainder, base64url-encode the digest without padding, and
    /// re-prepend `sha256~` (spec.md §4.5). A token whose derived object
    /// does not exist on the cluster yields [`AuthError::TokenNotFound`].
    pub async fn logout(
        &self,
        service_account: &dyn ServiceAccountClient,
        token: &str,
    ) -> Result<(), AuthError> {
        let name = oauth_access_token_name(token);
        let deleted = service_account.delete_oauth_access_token(&name).await?;
        if deleted {
            Ok(())
        } else {
            Err(AuthError::TokenNotFound)
        }
    }
}

fn oauth_access_token_name(token: &str) -> String {
    let remainder = token.strip_prefix("sha256~").unwrap_or(token);
    let digest = Sha256::digest(remainder.as_bytes());
    let encoded = base64::Engine::encode(
        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
        digest,
    );
    format!("sha256~{encoded}")
}
