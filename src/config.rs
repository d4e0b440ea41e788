use std::{env, path::PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::models::DocumentCategory;

const DEFAULT_REGION: &str = "us";
const DEFAULT_SECRET_NAME: &str = "token";
const DEFAULT_UPLOAD_FOLDER: &str = "uploads";
const DEFAULT_GMAIL_TOKEN_DIR: &str = "creds";
const GMAIL_TOKEN_FILE: &str = "gmail_token.json";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const DEFAULT_DB_CONNECTIONS: u32 = 10;
const DEFAULT_PORT: u16 = 8080;

/// Document AI processor identifiers, one per document category.
#[derive(Clone, Debug)]
pub struct ProcessorIds {
    pub identity: String,
    pub tax: String,
    pub chamber: String,
}

impl ProcessorIds {
    pub fn for_category(&self, category: DocumentCategory) -> &str {
        match category {
            DocumentCategory::IdentityDocument => &self.identity,
            DocumentCategory::TaxRegistration => &self.tax,
            DocumentCategory::ChamberOfCommerce => &self.chamber,
        }
    }
}

/// Process-wide configuration, read once at startup and shared read-only.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub project_id: String,
    pub region: String,
    pub processors: ProcessorIds,
    pub bucket_name: String,
    pub storage_credentials_path: Option<PathBuf>,
    pub service_credentials_path: Option<PathBuf>,
    pub mail_sender: String,
    pub gmail_token_path: PathBuf,
    pub token_secret_name: String,
    pub session_validation_url: Option<String>,
    pub upload_folder: PathBuf,
    pub max_upload_bytes: usize,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Blank values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let require = |key: &str| get(key).ok_or_else(|| anyhow!("{key} env var is missing"));

        let db_max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DB_MAX_CONNECTIONS is not a number: {raw}"))?,
            None => DEFAULT_DB_CONNECTIONS,
        };

        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("MAX_UPLOAD_BYTES is not a number: {raw}"))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let port = get("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let gmail_token_path = PathBuf::from(
            get("GMAIL_TOKEN_PATH").unwrap_or_else(|| DEFAULT_GMAIL_TOKEN_DIR.to_string()),
        )
        .join(GMAIL_TOKEN_FILE);

        Ok(Self {
            database_url: require("DATABASE_URL")?,
            db_max_connections,
            project_id: require("GCP_PROJECT_ID")?,
            region: get("GCP_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            processors: ProcessorIds {
                identity: require("PROCESSOR_CEDULAS")?,
                tax: require("PROCESSOR_RUT")?,
                chamber: require("PROCESSOR_CAMARA")?,
            },
            bucket_name: require("GCS_BUCKET_NAME")?,
            storage_credentials_path: get("GCS_CREDENTIALS_PATH").map(PathBuf::from),
            service_credentials_path: get("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from),
            mail_sender: require("GMAIL_SENDER")?,
            gmail_token_path,
            token_secret_name: get("TOKEN_SECRET_NAME")
                .unwrap_or_else(|| DEFAULT_SECRET_NAME.to_string()),
            session_validation_url: get("SESSION_VALIDATION_URL"),
            upload_folder: PathBuf::from(
                get("UPLOAD_FOLDER").unwrap_or_else(|| DEFAULT_UPLOAD_FOLDER.to_string()),
            ),
            max_upload_bytes,
            port,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_config(upload_folder: PathBuf) -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/intake_test".to_string(),
        db_max_connections: 1,
        project_id: "test-project".to_string(),
        region: DEFAULT_REGION.to_string(),
        processors: ProcessorIds {
            identity: "proc-identity".to_string(),
            tax: "proc-tax".to_string(),
            chamber: "proc-chamber".to_string(),
        },
        bucket_name: "intake-bucket".to_string(),
        storage_credentials_path: None,
        service_credentials_path: None,
        mail_sender: "noreply@example.com".to_string(),
        gmail_token_path: PathBuf::from("creds").join(GMAIL_TOKEN_FILE),
        token_secret_name: DEFAULT_SECRET_NAME.to_string(),
        session_validation_url: None,
        upload_folder,
        max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        port: DEFAULT_PORT,
    }
}
