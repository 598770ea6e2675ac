//! The error taxonomy described in spec.md §7.
//!
//! Every variant is reachable from the public façade; none of them panic.
//! `AuthError` is `Clone` so it can live inside a memoized cache value
//! (see [`crate::oauth`]) without giving every caller an `Arc`.

/// A Kubernetes `(group, resource, subresource)` triple in its canonical
/// string form, carried by [`AuthError::PermissionDenied`] for diagnostics.
pub type GroupResourceString = String;

/// The error kinds a caller of this crate can observe.
///
/// These are *kinds*, not wire types: the façade never serializes this
/// enum directly, it only uses it to decide between 401/403/redirect/5xx
/// (spec.md §7, "Propagation policy").
#[derive(Debug, Clone)]
pub enum AuthError {
    /// A `SelfSubjectAccessReview` came back with `allowed: false`.
    PermissionDenied {
        namespace: String,
        group_resource: GroupResourceString,
        verb: String,
        reason: String,
    },
    /// The cluster's `TokenReview` reported a non-blank `error`, or
    /// `authenticated != true`.
    AuthorizationError(String),
    /// A cluster API call failed in transport (connection, TLS, non-2xx
    /// response unrelated to `allowed`, deserialization, etc.).
    ClusterClientError(String),
    /// `getLoginRedirectUrl` needs an environment variable that is unset.
    MissingEnvironmentVariable(String),
    /// Logout targeted an `OAuthAccessToken` that does not exist.
    TokenNotFound,
    /// A programmer error: an unknown `ResourceVerb`, or similarly
    /// impossible input reached a place that assumes a closed set.
    InvalidArgument(String),
    /// The access-review fan-out did not complete within its deadline
    /// (spec.md §4.3, the 15-second bound).
    Timeout,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::PermissionDenied {
                namespace,
                group_resource,
                verb,
                reason,
            } => write!(
                f,
                "permission denied: verb={verb} resource={group_resource} namespace={namespace}: {reason}"
            ),
            AuthError::AuthorizationError(msg) => write!(f, "authorization error: {msg}"),
            AuthError::ClusterClientError(msg) => write!(f, "cluster client error: {msg}"),
            AuthError::MissingEnvironmentVariable(name) => {
                write!(f, "missing environment variable: {name}")
            }
            AuthError::TokenNotFound => write!(f, "token not found"),
            AuthError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            AuthError::Timeout => write!(f, "access review fan-out timed out"),
        }
    }
}

impl std::error::Error for AuthError {}

impl AuthError {
    /// Whether `getLoginRedirectUrl` should convert this failure into "please
    /// log in" (spec.md §4.5 / §7) instead of rethrowing it.
    pub fn should_redirect_to_login(&self) -> bool {
        matches!(
            self,
            AuthError::PermissionDenied { .. }
                | AuthError::AuthorizationError(_)
                | AuthError::ClusterClientError(_)
        )
    }
}

impl From<kube::Error> for AuthError {
    fn from(err: kube::Error) -> Self {
        AuthError::ClusterClientError(err.to_string())
    }
}
