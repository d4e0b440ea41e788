//! Caller authorization. Both strategies fail closed and never cache a verdict.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use subtle::ConstantTimeEq;
use tracing::{debug, error, warn};

use crate::secrets::SecretProvider;

/// Proof that the current request presented an accepted bearer token.
#[derive(Clone, Debug)]
pub struct AuthContext {
    token_hint: String,
}

impl AuthContext {
    fn for_token(token: &str) -> Self {
        Self {
            token_hint: token.chars().take(10).collect(),
        }
    }

    /// First characters of the accepted token, for log correlation only.
    pub fn token_hint(&self) -> &str {
        &self.token_hint
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::for_token("test-token")
    }
}

/// "Is this caller authorized" capability.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn is_authorized(&self, token: &str) -> bool;
}

/// Resolves an [`AuthContext`] for a presented token, or `None` when it is absent or rejected.
pub async fn authorize(validator: &dyn TokenValidator, token: Option<&str>) -> Option<AuthContext> {
    let token = token.map(str::trim).filter(|token| !token.is_empty())?;
    if validator.is_authorized(token).await {
        debug!(token_hint = %AuthContext::for_token(token).token_hint(), "bearer token accepted");
        Some(AuthContext::for_token(token))
    } else {
        None
    }
}

/// Compares the presented token with the shared secret, fetched fresh on every call.
pub struct SharedSecretValidator {
    secrets: Arc<dyn SecretProvider>,
}

impl SharedSecretValidator {
    pub fn new(secrets: Arc<dyn SecretProvider>) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl TokenValidator for SharedSecretValidator {
    async fn is_authorized(&self, token: &str) -> bool {
        match self.secrets.shared_token().await {
            Ok(expected) => secure_compare(token, &expected),
            Err(err) => {
                error!(%err, "shared token unavailable, rejecting caller");
                false
            }
        }
    }
}

/// Forwards the token to an external session endpoint; only a 2xx answer is accepted.
pub struct IntrospectionValidator {
    http: Client,
    url: String,
}

impl IntrospectionValidator {
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenValidator for IntrospectionValidator {
    async fn is_authorized(&self, token: &str) -> bool {
        match self.http.get(&self.url).bearer_auth(token).send().await {
            Ok(response) => {
                let accepted = response.status().is_success();
                if !accepted {
                    debug!(status = %response.status(), "session endpoint rejected token");
                }
                accepted
            }
            Err(err) => {
                warn!(%err, "session endpoint unreachable, rejecting caller");
                false
            }
        }
    }
}

fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretError;

    struct FixedSecret(Option<&'static str>);

    #[async_trait]
    impl SecretProvider for FixedSecret {
        async fn shared_token(&self) -> Result<String, SecretError> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| SecretError::Unavailable("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn accepts_matching_token() {
        let validator = SharedSecretValidator::new(Arc::new(FixedSecret(Some("abc123"))));
        let context = authorize(&validator, Some("abc123")).await.unwrap();
        assert_eq!(context.token_hint(), "abc123");
    }

    #[tokio::test]
    async fn rejects_mismatched_or_missing_token() {
        let validator = SharedSecretValidator::new(Arc::new(FixedSecret(Some("abc123"))));
        assert!(authorize(&validator, Some("abc124")).await.is_none());
        assert!(authorize(&validator, Some("   ")).await.is_none());
        assert!(authorize(&validator, None).await.is_none());
    }

    #[tokio::test]
    async fn fails_closed_when_secret_is_unavailable() {
        let validator = SharedSecretValidator::new(Arc::new(FixedSecret(None)));
        assert!(!validator.is_authorized("anything").await);
    }

    #[tokio::test]
    async fn introspection_fails_closed_when_endpoint_is_unreachable() {
        let validator = IntrospectionValidator::new(Client::new(), "http://127.0.0.1:9/session");
        assert!(!validator.is_authorized("token").await);
    }

    #[test]
    fn hint_is_truncated() {
        let context = AuthContext::for_token("0123456789abcdef");
        assert_eq!(context.token_hint(), "0123456789");
    }
}
