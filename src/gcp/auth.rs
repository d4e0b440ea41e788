use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::body_preview;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Clone)]
enum CredentialSource {
    ServiceAccount(ServiceAccountKey),
    MetadataServer,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Hands out OAuth2 access tokens for Google APIs, refreshing shortly before expiry.
#[derive(Clone)]
pub struct GoogleTokenSource {
    http: Client,
    source: CredentialSource,
    scope: String,
    cached: Arc<RwLock<Option<CachedToken>>>,
}

impl GoogleTokenSource {
    /// Uses the service-account key at `key_path`, or the metadata server when no key is given.
    pub fn new(http: Client, key_path: Option<&Path>, scope: impl Into<String>) -> Result<Self> {
        let source = match key_path {
            Some(path) => {
                let raw = fs::read_to_string(path).with_context(|| {
                    format!("failed to read service account key {}", path.display())
                })?;
                let key: ServiceAccountKey = serde_json::from_str(&raw).with_context(|| {
                    format!("invalid service account key {}", path.display())
                })?;
                CredentialSource::ServiceAccount(key)
            }
            None => CredentialSource::MetadataServer,
        };

        Ok(Self {
            http,
            source,
            scope: scope.into(),
            cached: Arc::new(RwLock::new(None)),
        })
    }

    pub async fn access_token(&self) -> Result<String> {
        {
            let guard = self.cached.read().await;
            if let Some(token) = guard.as_ref() {
                if token.expires_at > Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) {
                    return Ok(token.value.clone());
                }
            }
        }

        let fresh = match &self.source {
            CredentialSource::ServiceAccount(key) => self.exchange_assertion(key).await?,
            CredentialSource::MetadataServer => self.fetch_from_metadata().await?,
        };

        let value = fresh.access_token.clone();
        let expires_at = Utc::now() + Duration::seconds(fresh.expires_in.unwrap_or(3600));
        *self.cached.write().await = Some(CachedToken {
            value: fresh.access_token,
            expires_at,
        });
        debug!(%expires_at, "refreshed google access token");

        Ok(value)
    }

    async fn exchange_assertion(&self, key: &ServiceAccountKey) -> Result<TokenResponse> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: &self.scope,
            aud: &key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("service account private key is not a valid RSA PEM")?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .context("failed to sign token assertion")?;

        let response = self
            .http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .context("token endpoint unreachable")?;

        parse_token_response(response).await
    }

    async fn fetch_from_metadata(&self) -> Result<TokenResponse> {
        let response = self
            .http
            .get(METADATA_TOKEN_URL)
            .query(&[("scopes", self.scope.as_str())])
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .context("metadata server unreachable")?;

        parse_token_response(response).await
    }
}

async fn parse_token_response(response: reqwest::Response) -> Result<TokenResponse> {
    let status = response.status();
    let body = response
        .text()
        .await
        .context("failed to read token response body")?;
    if !status.is_success() {
        bail!("token request failed with status {status}: {}", body_preview(&body));
    }
    serde_json::from_str(&body).context("unexpected token response payload")
}
