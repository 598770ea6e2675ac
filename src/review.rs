//! Component C2: submitting a `TokenReview` and reducing its status to a
//! single authenticated/not-authenticated verdict, plus the username the
//! cluster reports back (spec.md §4.2).

use tracing::{info_span, Instrument};

use crate::client::ServiceAccountClient;
use crate::error::AuthError;

/// The subset of `TokenReviewStatus` callers of this crate need: whether the
/// token authenticated, and the username the API server attributes to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
}

/// Submit a `TokenReview` for `token` and report whether it authenticated.
///
/// A blank `error` field and `authenticated == Some(true)` is success;
/// anything else is folded into [`AuthError::AuthorizationError`] rather
/// than surfaced as a transport failure, since the cluster answered, it
/// just didn't vouch for the token (spec.md §4.2).
///
/// Wrapped in a tracing span carrying the fields Cryostat's event log
/// expects of an auth request (`category = "Cryostat"`, `label =
/// "AuthRequest"`), recording `requestSuccessful` on exit.
pub async fn review_token(
    client: &dyn ServiceAccountClient,
    token: &str,
) -> Result<bool, AuthError> {
    let span = info_span!(
        "auth_request",
        category = "Cryostat",
        label = "AuthRequest",
        requestSuccessful = tracing::field::Empty,
    );
    async {
        let result = client.review_token(token).await;
        let authenticated = matches!(
            &result,
            Ok(status) if status.error.as_deref().unwrap_or("").is_empty()
                && status.authenticated.unwrap_or(false)
        );
        tracing::Span::current().record("requestSuccessful", authenticated);
        let status = result?;
        if let Some(error) = status.error.filter(|e| !e.is_empty()) {
            return Err(AuthError::AuthorizationError(error));
        }
        if !status.authenticated.unwrap_or(false) {
            return Err(AuthError::AuthorizationError(
                "token did not authenticate".to_string(),
            ));
        }
        Ok(true)
    }
    .instrument(span)
    .await
}

/// Submit a `TokenReview` for `token` and return the reported username.
///
/// Distinct from [`review_token`] in return shape only; both perform the
/// same cluster call and share its success/failure semantics (spec.md
/// §4.2, §6 `getUserInfo`).
pub async fn user_info(
    client: &dyn ServiceAccountClient,
    token: &str,
) -> Result<UserInfo, AuthError> {
    let status = client.review_token(token).await?;
    if let Some(error) = status.error.filter(|e| !e.is_empty()) {
        return Err(AuthError::AuthorizationError(error));
    }
    if !status.authenticated.unwrap_or(false) {
        return Err(AuthError::AuthorizationError(
            "token did not authenticate".to_string(),
        ));
    }
    let username = status
        .user
        .and_then(|u| u.username)
        .ok_or_else(|| AuthError::AuthorizationError("TokenReview reported no username".into()))?;
    Ok(UserInfo { username })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::authentication::v1::{TokenReviewStatus, UserInfo as K8sUserInfo};

    struct FakeServiceAccountClient {
        status: Result<TokenReviewStatus, AuthError>,
    }

    #[async_trait::async_trait]
    impl ServiceAccountClient for FakeServiceAccountClient {
        async fn review_token(&self, _token: &str) -> Result<TokenReviewStatus, AuthError> {
            self.status.clone()
        }

        async fn delete_oauth_access_token(&self, _name: &str) -> Result<bool, AuthError> {
            unimplemented!()
        }

        async fn fetch_oauth_metadata(&self) -> Result<serde_json::Value, AuthError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn review_token_succeeds_when_authenticated() {
        let client = FakeServiceAccountClient {
            status: Ok(TokenReviewStatus {
                authenticated: Some(true),
                error: None,
                user: Some(K8sUserInfo {
                    username: Some("alice".into()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        };
        assert!(review_token(&client, "tok").await.unwrap());
    }

    #[tokio::test]
    async fn review_token_fails_on_reported_error() {
        let client = FakeServiceAccountClient {
            status: Ok(TokenReviewStatus {
                authenticated: Some(false),
                error: Some("token expired".into()),
                ..Default::default()
            }),
        };
        let err = review_token(&client, "tok").await.unwrap_err();
        assert!(matches!(err, AuthError::AuthorizationError(_)));
    }

    #[tokio::test]
    async fn review_token_fails_when_not_authenticated() {
        let client = FakeServiceAccountClient {
            status: Ok(TokenReviewStatus {
                authenticated: Some(false),
                error: None,
                ..Default::default()
            }),
        };
        assert!(review_token(&client, "tok").await.is_err());
    }

    #[tokio::test]
    async fn user_info_reports_username() {
        let client = FakeServiceAccountClient {
            status: Ok(TokenReviewStatus {
                authenticated: Some(true),
                error: None,
                user: Some(K8sUserInfo {
                    username: Some("bob".into()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        };
        let info = user_info(&client, "tok").await.unwrap();
        assert_eq!(info.username, "bob");
    }

    #[tokio::test]
    async fn user_info_propagates_transport_error() {
        let client = FakeServiceAccountClient {
            status: Err(AuthError::ClusterClientError("connection refused".into())),
        };
        let err = user_info(&client, "tok").await.unwrap_err();
        assert!(matches!(err, AuthError::ClusterClientError(_)));
    }
}
