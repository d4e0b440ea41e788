use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::NotificationError;
use crate::gcp::body_preview;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const EXPIRY_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Authorized-user OAuth credentials for the mail API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthCredentials {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl OAuthCredentials {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.expiry) {
            (Some(token), Some(expiry)) if !token.is_empty() => {
                expiry > now + Duration::seconds(EXPIRY_MARGIN_SECS)
            }
            (Some(token), None) => !token.is_empty(),
            _ => false,
        }
    }

    fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}

/// Persistence for the mail credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<OAuthCredentials>>;
    async fn save(&self, credentials: &OAuthCredentials) -> Result<()>;
}

/// Stores credentials as a JSON document on disk.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<OAuthCredentials>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()));
            }
        };
        let credentials = serde_json::from_slice(&raw)
            .with_context(|| format!("invalid credentials file {}", self.path.display()))?;
        Ok(Some(credentials))
    }

    async fn save(&self, credentials: &OAuthCredentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(credentials)?;
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Loads credentials and refreshes them on expiry, persisting the refreshed copy.
#[derive(Clone)]
pub struct CredentialManager {
    http: Client,
    store: Arc<dyn CredentialStore>,
}

impl CredentialManager {
    pub fn new(http: Client, store: Arc<dyn CredentialStore>) -> Self {
        Self { http, store }
    }

    /// Valid credentials, refreshed when expired and a refresh token exists.
    pub async fn refresh_if_needed(&self) -> Result<OAuthCredentials, NotificationError> {
        let credentials = self
            .store
            .load()
            .await
            .map_err(|err| NotificationError::Credentials(format!("{err:#}")))?
            .ok_or(NotificationError::ReauthenticationRequired)?;

        if credentials.is_valid(Utc::now()) {
            return Ok(credentials);
        }

        if !credentials.can_refresh() {
            error!("mail credentials invalid and no refresh token present");
            return Err(NotificationError::ReauthenticationRequired);
        }

        let refreshed = self.refresh(credentials).await?;
        if let Err(err) = self.store.save(&refreshed).await {
            error!(?err, "failed to persist refreshed mail credentials");
        }
        info!("mail credentials refreshed");
        Ok(refreshed)
    }

    async fn refresh(
        &self,
        credentials: OAuthCredentials,
    ) -> Result<OAuthCredentials, NotificationError> {
        let refresh_token = credentials.refresh_token.clone().unwrap_or_default();
        let response = self
            .http
            .post(&credentials.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|err| NotificationError::Credentials(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| NotificationError::Credentials(err.to_string()))?;
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED
        {
            error!(%status, body = %body_preview(&body), "refresh token rejected");
            return Err(NotificationError::ReauthenticationRequired);
        }
        if !status.is_success() {
            return Err(NotificationError::Credentials(format!(
                "token refresh failed with status {status}: {}",
                body_preview(&body)
            )));
        }

        let parsed: RefreshResponse = serde_json::from_str(&body)
            .map_err(|err| NotificationError::Credentials(err.to_string()))?;

        Ok(OAuthCredentials {
            access_token: Some(parsed.access_token),
            expiry: Some(Utc::now() + Duration::seconds(parsed.expires_in.unwrap_or(3600))),
            refresh_token: parsed.refresh_token.or(credentials.refresh_token),
            ..credentials
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(
        access: Option<&str>,
        refresh: Option<&str>,
        expiry: Option<DateTime<Utc>>,
    ) -> OAuthCredentials {
        OAuthCredentials {
            access_token: access.map(str::to_string),
            refresh_token: refresh.map(str::to_string),
            expiry,
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            // Discard port: any refresh attempt fails fast without leaving the host.
            token_uri: "http://127.0.0.1:9/token".to_string(),
        }
    }

    #[test]
    fn validity_respects_expiry_margin() {
        let now = Utc::now();
        assert!(credentials(Some("a"), None, Some(now + Duration::minutes(10))).is_valid(now));
        assert!(!credentials(Some("a"), None, Some(now + Duration::seconds(30))).is_valid(now));
        assert!(!credentials(None, Some("r"), None).is_valid(now));
    }

    #[tokio::test]
    async fn file_store_round_trips_and_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("creds").join("gmail_token.json"));
        assert!(store.load().await.unwrap().is_none());

        let saved = credentials(Some("access"), Some("refresh"), None);
        store.save(&saved).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn valid_credentials_are_returned_without_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileCredentialStore::new(dir.path().join("token.json")));
        let current = credentials(Some("access"), None, Some(Utc::now() + Duration::hours(1)));
        store.save(&current).await.unwrap();

        let manager = CredentialManager::new(Client::new(), store);
        assert_eq!(manager.refresh_if_needed().await.unwrap(), current);
    }

    #[tokio::test]
    async fn expired_without_refresh_token_requires_reauthentication() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileCredentialStore::new(dir.path().join("token.json")));
        store
            .save(&credentials(Some("old"), None, Some(Utc::now() - Duration::hours(1))))
            .await
            .unwrap();

        let manager = CredentialManager::new(Client::new(), store);
        assert!(matches!(
            manager.refresh_if_needed().await,
            Err(NotificationError::ReauthenticationRequired)
        ));
    }

    #[tokio::test]
    async fn missing_credentials_require_reauthentication() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileCredentialStore::new(dir.path().join("absent.json")));
        let manager = CredentialManager::new(Client::new(), store);
        assert!(matches!(
            manager.refresh_if_needed().await,
            Err(NotificationError::ReauthenticationRequired)
        ));
    }

    #[tokio::test]
    async fn unreachable_token_endpoint_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileCredentialStore::new(dir.path().join("token.json")));
        let expired = credentials(
            Some("old"),
            Some("refresh"),
            Some(Utc::now() - Duration::hours(1)),
        );
        store.save(&expired).await.unwrap();

        let manager = CredentialManager::new(Client::new(), store.clone());
        assert!(matches!(
            manager.refresh_if_needed().await,
            Err(NotificationError::Credentials(_))
        ));
        assert_eq!(store.load().await.unwrap(), Some(expired));
    }
}
