use std::path::Path;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Client;
use thiserror::Error;
use tracing::info;

use crate::{
    extraction::infer_mime_type,
    gcp::{GoogleTokenSource, body_preview},
};

const UPLOAD_ENDPOINT: &str = "https://storage.googleapis.com/upload/storage/v1/b";
const PUBLIC_HOST: &str = "https://storage.googleapis.com";

/// Characters left as-is in public object URLs (unreserved plus `/` and `~`).
const OBJECT_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'~')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.');

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("storage credentials unavailable: {0}")]
    Credentials(String),

    #[error("failed to read local file: {0}")]
    Io(#[from] std::io::Error),
}

/// Pushes a local file into the bucket under `{folder}/{object_name}`.
#[async_trait]
pub trait StorageUploader: Send + Sync {
    /// Returns the public URL of the stored object.
    async fn upload(
        &self,
        local_path: &Path,
        folder: &str,
        object_name: &str,
    ) -> Result<String, StorageError>;
}

#[derive(Clone)]
pub struct GcsUploader {
    http: Client,
    tokens: GoogleTokenSource,
    bucket: String,
}

impl GcsUploader {
    pub fn new(http: Client, tokens: GoogleTokenSource, bucket: impl Into<String>) -> Self {
        Self {
            http,
            tokens,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl StorageUploader for GcsUploader {
    async fn upload(
        &self,
        local_path: &Path,
        folder: &str,
        object_name: &str,
    ) -> Result<String, StorageError> {
        let object = object_key(folder, object_name);
        let bytes = tokio::fs::read(local_path).await?;
        let size = bytes.len();
        let access_token = self
            .tokens
            .access_token()
            .await
            .map_err(|err| StorageError::Credentials(format!("{err:#}")))?;

        let response = self
            .http
            .post(format!("{UPLOAD_ENDPOINT}/{}/o", self.bucket))
            .query(&[("uploadType", "media"), ("name", object.as_str())])
            .bearer_auth(access_token)
            .header(reqwest::header::CONTENT_TYPE, infer_mime_type(local_path))
            .body(bytes)
            .send()
            .await
            .map_err(|err| StorageError::UploadFailed(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::UploadFailed(format!(
                "bucket rejected `{object}` with status {status}: {}",
                body_preview(&body)
            )));
        }

        info!(bucket = %self.bucket, %object, size, "uploaded object");
        Ok(public_url(&self.bucket, &object))
    }
}

fn object_key(folder: &str, object_name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        object_name.to_string()
    } else {
        format!("{folder}/{object_name}")
    }
}

pub fn public_url(bucket: &str, object: &str) -> String {
    format!(
        "{PUBLIC_HOST}/{bucket}/{}",
        utf8_percent_encode(object, OBJECT_PATH)
    )
}
