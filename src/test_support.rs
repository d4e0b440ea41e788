//! Fakes for the external collaborators, shared by the workflow and router tests.

use std::{
    collections::HashSet,
    path::Path,
    sync::Mutex,
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    extraction::{DocumentExtractor, ExtractionError},
    models::{DocumentCategory, ExtractedFields},
    notify::{NotificationError, Notifier, OutgoingEmail},
    session::TokenValidator,
    storage::{StorageError, StorageUploader, public_url},
    workflow::{SubmissionRequest, UploadedDocument},
};

pub const TEST_BUCKET: &str = "intake-bucket";
pub const VALID_TOKEN: &str = "s3cr3t-token";

/// Records every upload; optionally fails from the n-th call on.
#[derive(Default)]
pub struct RecordingUploader {
    uploads: Mutex<Vec<(String, String)>>,
    fail_from: Option<usize>,
}

impl RecordingUploader {
    pub fn failing_from(call: usize) -> Self {
        Self {
            fail_from: Some(call),
            ..Self::default()
        }
    }

    /// `(folder, object_name)` pairs in upload order.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageUploader for RecordingUploader {
    async fn upload(
        &self,
        local_path: &Path,
        folder: &str,
        object_name: &str,
    ) -> Result<String, StorageError> {
        assert!(local_path.exists(), "scratch file must exist during upload");
        let mut uploads = self.uploads.lock().unwrap();
        if self.fail_from.is_some_and(|limit| uploads.len() >= limit) {
            return Err(StorageError::UploadFailed("bucket unavailable".to_string()));
        }
        uploads.push((folder.to_string(), object_name.to_string()));
        Ok(public_url(TEST_BUCKET, &format!("{folder}/{object_name}")))
    }
}

/// Returns one field per document; processors listed in `failing` error out.
#[derive(Default)]
pub struct ScriptedExtractor {
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExtractor {
    pub fn failing_for(processor_ids: &[&str]) -> Self {
        Self {
            failing: processor_ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentExtractor for ScriptedExtractor {
    async fn extract(
        &self,
        path: &Path,
        processor_id: &str,
    ) -> Result<ExtractedFields, ExtractionError> {
        self.calls.lock().unwrap().push(processor_id.to_string());
        if self.failing.contains(processor_id) {
            return Err(ExtractionError::Request("processor unavailable".to_string()));
        }
        let mut fields = ExtractedFields::new();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        fields.insert_entity("Nombre Archivo", name, 0.9321);
        Ok(fields)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError> {
        if self.fail {
            return Err(NotificationError::Send("status 503".to_string()));
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

/// Accepts exactly one token.
pub struct StaticValidator(pub &'static str);

#[async_trait]
impl TokenValidator for StaticValidator {
    async fn is_authorized(&self, token: &str) -> bool {
        token == self.0
    }
}

pub fn document(file_name: &str) -> UploadedDocument {
    UploadedDocument {
        file_name: file_name.to_string(),
        content: Bytes::from_static(b"%PDF-1.4 test"),
    }
}

/// A complete upload for user 42.
pub fn complete_request() -> SubmissionRequest {
    let mut request = SubmissionRequest {
        user_id: Some("42".to_string()),
        email: Some("a@b.com".to_string()),
        ..SubmissionRequest::default()
    };
    request
        .documents
        .insert(DocumentCategory::IdentityDocument, document("cedula.pdf"));
    request
        .documents
        .insert(DocumentCategory::TaxRegistration, document("rut.pdf"));
    request
        .documents
        .insert(DocumentCategory::ChamberOfCommerce, document("camara.jpg"));
    request
}
