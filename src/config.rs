use std::time::Duration;

/// Configuration for the auth manager: cluster identity, OAuth client
/// registration, and the tunable timeouts the spec calls out as fixed but
/// flags as candidates for configurability (spec.md §9, open question 3).
///
/// Shaped after `r2e_security::SecurityConfig` and
/// `r2e_oidc::config::OidcServerConfig`: an unavoidable-fields constructor
/// plus `with_*` builders for everything that has a sane default.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// The pod's own namespace, used as the `namespace` field on every
    /// `SelfSubjectAccessReview` and in the OAuth `client_id`.
    pub namespace: String,

    /// Name of the environment variable holding the OAuth client id suffix
    /// (default: `CRYOSTAT_OAUTH_CLIENT_ID`).
    pub oauth_client_id_env: String,

    /// Name of the environment variable holding the OAuth role name
    /// (default: `CRYOSTAT_OAUTH_ROLE`).
    pub oauth_role_env: String,

    /// Overall deadline for one `validateToken` access-review fan-out
    /// (spec.md §4.3: fixed at 15s in the source; exposed here as
    /// configurable per open question 3, default unchanged).
    pub access_review_timeout: Duration,

    /// Idle-expiry duration for the per-token client cache (spec.md §4.6:
    /// fixed at 5 minutes in the source).
    pub client_cache_idle_timeout: Duration,
}

impl AuthConfig {
    /// Create a new config for the given pod namespace, with the source's
    /// default timeouts and environment variable names.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            oauth_client_id_env: "CRYOSTAT_OAUTH_CLIENT_ID".to_string(),
            oauth_role_env: "CRYOSTAT_OAUTH_ROLE".to_string(),
            access_review_timeout: Duration::from_secs(15),
            client_cache_idle_timeout: Duration::from_secs(5 * 60),
        }
    }

    /// Override the access-review fan-out deadline.
    pub fn with_access_review_timeout(mut self, timeout: Duration) -> Self {
        self.access_review_timeout = timeout;
        self
    }

    /// Override the per-token client cache idle-expiry duration.
    pub fn with_client_cache_idle_timeout(mut self, timeout: Duration) -> Self {
        self.client_cache_idle_timeout = timeout;
        self
    }

    /// Override the environment variable name read for the OAuth client id.
    pub fn with_oauth_client_id_env(mut self, name: impl Into<String>) -> Self {
        self.oauth_client_id_env = name.into();
        self
    }

    /// Override the environment variable name read for the OAuth role.
    pub fn with_oauth_role_env(mut self, name: impl Into<String>) -> Self {
        self.oauth_role_env = name.into();
        self
    }
}
