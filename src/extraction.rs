use std::path::Path;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    gcp::{GoogleTokenSource, body_preview},
    models::ExtractedFields,
};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("processor request failed: {0}")]
    Request(String),

    #[error("processor credentials unavailable: {0}")]
    Credentials(String),

    #[error("unexpected processor response: {0}")]
    Malformed(String),

    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

/// Sends one document to a named processor and flattens the entities it finds.
///
/// An unsupported document format is not an error: implementations return
/// [`ExtractedFields::soft_error`] so the caller can keep going.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(
        &self,
        path: &Path,
        processor_id: &str,
    ) -> Result<ExtractedFields, ExtractionError>;
}

/// MIME type from the file extension, defaulting to PDF.
pub fn infer_mime_type(path: &Path) -> String {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => mime::IMAGE_JPEG.to_string(),
        "png" => mime::IMAGE_PNG.to_string(),
        "gif" => mime::IMAGE_GIF.to_string(),
        "bmp" => mime::IMAGE_BMP.to_string(),
        "tif" | "tiff" => "image/tiff".to_string(),
        "webp" => "image/webp".to_string(),
        _ => mime::APPLICATION_PDF.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    #[serde(default)]
    document: Option<ProcessedDocument>,
}

#[derive(Debug, Default, Deserialize)]
struct ProcessedDocument {
    #[serde(default)]
    entities: Vec<Entity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Entity {
    #[serde(rename = "type", default)]
    entity_type: String,
    #[serde(default)]
    mention_text: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Document AI REST client.
#[derive(Clone)]
pub struct DocumentAiExtractor {
    http: Client,
    tokens: GoogleTokenSource,
    project_id: String,
    location: String,
}

impl DocumentAiExtractor {
    pub fn new(
        http: Client,
        tokens: GoogleTokenSource,
        project_id: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            http,
            tokens,
            project_id: project_id.into(),
            location: location.into(),
        }
    }

    fn process_url(&self, processor_id: &str) -> String {
        format!(
            "https://{location}-documentai.googleapis.com/v1/projects/{project}/locations/{location}/processors/{processor_id}:process",
            location = self.location,
            project = self.project_id,
        )
    }
}

#[async_trait]
impl DocumentExtractor for DocumentAiExtractor {
    async fn extract(
        &self,
        path: &Path,
        processor_id: &str,
    ) -> Result<ExtractedFields, ExtractionError> {
        let mime_type = infer_mime_type(path);
        let content = tokio::fs::read(path).await?;
        let access_token = self
            .tokens
            .access_token()
            .await
            .map_err(|err| ExtractionError::Credentials(format!("{err:#}")))?;

        let payload = json!({
            "rawDocument": {
                "content": BASE64.encode(&content),
                "mimeType": mime_type,
            }
        });

        let response = self
            .http
            .post(self.process_url(processor_id))
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ExtractionError::Request(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ExtractionError::Request(err.to_string()))?;

        if let Some(reason) = unsupported_format_reason(status, &body) {
            warn!(%processor_id, %mime_type, %reason, "processor rejected document format");
            return Ok(ExtractedFields::soft_error(format!(
                "Formato no soportado ({mime_type}): {reason}"
            )));
        }

        if !status.is_success() {
            return Err(ExtractionError::Request(format!(
                "processor {processor_id} answered {status}: {}",
                body_preview(&body)
            )));
        }

        let fields = parse_process_response(&body)?;
        if fields.is_empty() {
            warn!(%processor_id, "processor returned no entities");
        }
        info!(%processor_id, fields = fields.iter().count(), "document processed");
        Ok(fields)
    }
}

/// The "unsupported format" class: HTTP 400 or an `INVALID_ARGUMENT` error status.
fn unsupported_format_reason(status: StatusCode, body: &str) -> Option<String> {
    let detail = serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error);

    let invalid_argument = detail
        .as_ref()
        .is_some_and(|detail| detail.status == "INVALID_ARGUMENT");
    if status != StatusCode::BAD_REQUEST && !invalid_argument {
        return None;
    }

    Some(match detail {
        Some(detail) if !detail.message.is_empty() => detail.message,
        _ => body_preview(body),
    })
}

fn parse_process_response(body: &str) -> Result<ExtractedFields, ExtractionError> {
    let parsed: ProcessResponse =
        serde_json::from_str(body).map_err(|err| ExtractionError::Malformed(err.to_string()))?;

    let mut fields = ExtractedFields::new();
    for entity in parsed.document.unwrap_or_default().entities {
        if entity.entity_type.trim().is_empty() {
            continue;
        }
        fields.insert_entity(&entity.entity_type, entity.mention_text, entity.confidence);
    }
    Ok(fields)
}
