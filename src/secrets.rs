use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::gcp::{GoogleTokenSource, body_preview};

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret store unavailable: {0}")]
    Unavailable(String),

    #[error("secret payload malformed: {0}")]
    Malformed(String),
}

/// Source of the shared bearer token that inbound callers must present.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn shared_token(&self) -> Result<String, SecretError>;
}

/// Reads the latest version of a Secret Manager secret holding `{"token": "..."}`.
#[derive(Clone)]
pub struct SecretManagerProvider {
    http: Client,
    tokens: GoogleTokenSource,
    project_id: String,
    secret_name: String,
}

#[derive(Deserialize)]
struct AccessSecretResponse {
    payload: SecretPayload,
}

#[derive(Deserialize)]
struct SecretPayload {
    data: String,
}

#[derive(Deserialize)]
struct SharedTokenDocument {
    token: Option<String>,
}

impl SecretManagerProvider {
    pub fn new(
        http: Client,
        tokens: GoogleTokenSource,
        project_id: impl Into<String>,
        secret_name: impl Into<String>,
    ) -> Self {
        Self {
            http,
            tokens,
            project_id: project_id.into(),
            secret_name: secret_name.into(),
        }
    }

    fn access_url(&self) -> String {
        format!(
            "https://secretmanager.googleapis.com/v1/projects/{}/secrets/{}/versions/latest:access",
            self.project_id, self.secret_name
        )
    }
}

#[async_trait]
impl SecretProvider for SecretManagerProvider {
    async fn shared_token(&self) -> Result<String, SecretError> {
        let access_token = self
            .tokens
            .access_token()
            .await
            .map_err(|err| SecretError::Unavailable(format!("{err:#}")))?;

        let response = self
            .http
            .get(self.access_url())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| SecretError::Unavailable(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| SecretError::Unavailable(err.to_string()))?;
        if !status.is_success() {
            return Err(SecretError::Unavailable(format!(
                "secret access failed with status {status}: {}",
                body_preview(&body)
            )));
        }

        let parsed: AccessSecretResponse = serde_json::from_str(&body)
            .map_err(|err| SecretError::Malformed(err.to_string()))?;
        decode_shared_token(&parsed.payload.data)
    }
}

/// Decodes the base64 secret payload and pulls out its `token` member.
fn decode_shared_token(encoded: &str) -> Result<String, SecretError> {
    let raw = BASE64
        .decode(encoded.trim())
        .map_err(|err| SecretError::Malformed(format!("payload is not base64: {err}")))?;
    let document: SharedTokenDocument = serde_json::from_slice(&raw)
        .map_err(|err| SecretError::Malformed(format!("payload is not JSON: {err}")))?;

    document
        .token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| SecretError::Malformed("payload has no `token` member".to_string()))
}
