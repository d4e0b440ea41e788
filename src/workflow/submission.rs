use std::{collections::HashMap, path::PathBuf, sync::Arc};

use anyhow::anyhow;
use bytes::Bytes;
use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

use super::scratch::ScratchDir;
use crate::{
    config::ProcessorIds,
    db::{NewSubmission, SubmissionStore},
    error::{IntakeError, IntakeResult},
    extraction::DocumentExtractor,
    models::{DocumentCategory, ExtractedFields, StoredFile},
    session::AuthContext,
    storage::StorageUploader,
};

pub const MISSING_IDENTITY_MESSAGE: &str = "Falta el ID o el correo del usuario";
pub const MISSING_FILES_MESSAGE: &str = "Faltan uno o más archivos obligatorios";

#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub file_name: String,
    pub content: Bytes,
}

/// Raw upload as received; nothing is validated yet.
#[derive(Debug, Clone, Default)]
pub struct SubmissionRequest {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub documents: HashMap<DocumentCategory, UploadedDocument>,
}

struct ValidatedSubmission {
    user_id: i64,
    email: String,
    documents: Vec<(DocumentCategory, UploadedDocument)>,
}

fn validate(mut request: SubmissionRequest) -> IntakeResult<ValidatedSubmission> {
    let user_id = request
        .user_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let email = request
        .email
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let (Some(user_id), Some(email)) = (user_id, email) else {
        return Err(IntakeError::BadRequest(MISSING_IDENTITY_MESSAGE.to_string()));
    };
    let user_id: i64 = user_id.parse().map_err(|_| {
        IntakeError::BadRequest(format!("El ID del usuario no es válido: {user_id}"))
    })?;
    if user_id <= 0 {
        return Err(IntakeError::BadRequest(MISSING_IDENTITY_MESSAGE.to_string()));
    }

    let missing: Vec<&str> = DocumentCategory::ALL
        .iter()
        .filter(|category| {
            request
                .documents
                .get(*category)
                .is_none_or(|document| document.file_name.trim().is_empty())
        })
        .map(|category| category.form_field())
        .collect();
    if !missing.is_empty() {
        return Err(IntakeError::BadRequest(format!(
            "{MISSING_FILES_MESSAGE}: {}",
            missing.join(", ")
        )));
    }

    let documents = DocumentCategory::ALL
        .into_iter()
        .filter_map(|category| {
            request
                .documents
                .remove(&category)
                .map(|document| (category, document))
        })
        .collect();

    Ok(ValidatedSubmission {
        user_id,
        email,
        documents,
    })
}

/// Folder name derived for a user's first upload.
pub fn folder_name(date: NaiveDate, email: &str) -> String {
    format!("{}-{email}", date.format("%Y-%m-%d"))
}

/// Turns an authorized upload into a stored, annotated submission.
#[derive(Clone)]
pub struct SubmissionWorkflow {
    store: Arc<dyn SubmissionStore>,
    uploader: Arc<dyn StorageUploader>,
    extractor: Arc<dyn DocumentExtractor>,
    processors: ProcessorIds,
    scratch_root: PathBuf,
}

impl SubmissionWorkflow {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        uploader: Arc<dyn StorageUploader>,
        extractor: Arc<dyn DocumentExtractor>,
        processors: ProcessorIds,
        scratch_root: PathBuf,
    ) -> Self {
        Self {
            store,
            uploader,
            extractor,
            processors,
            scratch_root,
        }
    }

    pub async fn submit(
        &self,
        auth: &AuthContext,
        request: SubmissionRequest,
    ) -> IntakeResult<i64> {
        self.submit_on(auth, request, Local::now().date_naive()).await
    }

    pub async fn submit_on(
        &self,
        auth: &AuthContext,
        request: SubmissionRequest,
        today: NaiveDate,
    ) -> IntakeResult<i64> {
        let submission = validate(request)?;
        info!(
            user_id = submission.user_id,
            token_hint = %auth.token_hint(),
            "processing submission"
        );

        let folder = self.resolve_folder(&submission, today).await?;

        let mut scratch = ScratchDir::create(&self.scratch_root).await.map_err(|err| {
            IntakeError::Internal(anyhow!(err).context("failed to create scratch directory"))
        })?;
        debug!(path = %scratch.path().display(), "scratch directory ready");
        let result = self.process(&mut scratch, submission, &folder, today).await;
        scratch.remove().await;
        result
    }

    async fn resolve_folder(
        &self,
        submission: &ValidatedSubmission,
        today: NaiveDate,
    ) -> IntakeResult<String> {
        if let Some(folder) = self
            .store
            .folder_for_user(submission.user_id)
            .await
            .map_err(IntakeError::Persistence)?
        {
            return Ok(folder);
        }

        let candidate = folder_name(today, &submission.email);
        let folder = self
            .store
            .assign_folder_if_absent(submission.user_id, &submission.email, &candidate)
            .await
            .map_err(IntakeError::Persistence)?;
        info!(user_id = submission.user_id, %folder, "assigned storage folder");
        Ok(folder)
    }

    async fn process(
        &self,
        scratch: &mut ScratchDir,
        submission: ValidatedSubmission,
        folder: &str,
        today: NaiveDate,
    ) -> IntakeResult<i64> {
        let date_prefix = today.format("%Y-%m-%d").to_string();

        let mut files = Vec::with_capacity(submission.documents.len());
        let mut local_paths = Vec::with_capacity(submission.documents.len());
        for (category, document) in &submission.documents {
            let saved = scratch
                .save(&document.file_name, &document.content)
                .await
                .map_err(|err| {
                    IntakeError::Internal(anyhow!(err).context("failed to write scratch file"))
                })?;

            let final_name = format!("{date_prefix}-{}", saved.stored_name);
            let url = self.uploader.upload(&saved.path, folder, &final_name).await?;
            info!(category = category.as_str(), %final_name, "document uploaded");

            files.push(StoredFile {
                category: *category,
                original_name: document.file_name.clone(),
                final_name,
                url,
            });
            local_paths.push((*category, saved.path));
        }

        let mut extracted = Vec::with_capacity(local_paths.len());
        for (category, path) in &local_paths {
            let processor_id = self.processors.for_category(*category);
            let fields = match self.extractor.extract(path, processor_id).await {
                Ok(fields) => fields,
                Err(err) => {
                    warn!(
                        %err,
                        category = category.as_str(),
                        "extraction failed, keeping placeholder"
                    );
                    ExtractedFields::soft_error(err.to_string())
                }
            };
            if let Some(reason) = fields.error() {
                warn!(category = category.as_str(), %reason, "document not analysed");
            }
            extracted.push((*category, fields));
        }

        self.store
            .create_submission(NewSubmission {
                user_id: submission.user_id,
                email: submission.email,
                files,
                extracted,
            })
            .await
            .map_err(IntakeError::Persistence)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{
        config::test_config,
        db::memory::MemorySubmissionStore,
        models::{EXTRACTION_ERROR_FIELD, SubmissionStatus},
        test_support::{RecordingUploader, ScriptedExtractor, complete_request, document},
    };

    struct Harness {
        store: Arc<MemorySubmissionStore>,
        uploader: Arc<RecordingUploader>,
        extractor: Arc<ScriptedExtractor>,
        workflow: SubmissionWorkflow,
        root: tempfile::TempDir,
    }

    fn harness(
        store: MemorySubmissionStore,
        uploader: RecordingUploader,
        extractor: ScriptedExtractor,
    ) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path().to_path_buf());
        let store = Arc::new(store);
        let uploader = Arc::new(uploader);
        let extractor = Arc::new(extractor);
        let workflow = SubmissionWorkflow::new(
            store.clone(),
            uploader.clone(),
            extractor.clone(),
            config.processors.clone(),
            config.upload_folder.clone(),
        );
        Harness {
            store,
            uploader,
            extractor,
            workflow,
            root,
        }
    }

    fn default_harness() -> Harness {
        harness(
            MemorySubmissionStore::new(),
            RecordingUploader::default(),
            ScriptedExtractor::default(),
        )
    }

    fn may_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn scratch_is_empty(root: &Path) -> bool {
        std::fs::read_dir(root).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn submit_prefixes_with_local_date() {
        let h = default_harness();
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        h.workflow
            .submit(&AuthContext::for_tests(), complete_request())
            .await
            .unwrap();

        assert_eq!(h.store.folder(42), Some(format!("{today}-a@b.com")));
        let (_, first_object) = &h.uploader.uploads()[0];
        assert_eq!(first_object, &format!("{today}-cedula.pdf"));
    }

    #[tokio::test]
    async fn complete_upload_is_stored_unreviewed_with_three_files() {
        let h = default_harness();
        let id = h
            .workflow
            .submit_on(&AuthContext::for_tests(), complete_request(), may_first())
            .await
            .unwrap();

        let detail = h.store.get(id).unwrap();
        assert_eq!(detail.submission.status, SubmissionStatus::Unreviewed);
        assert_eq!(detail.submission.user_id, 42);
        assert_eq!(
            detail.files.iter().map(|file| file.category).collect::<Vec<_>>(),
            DocumentCategory::ALL.to_vec()
        );
        assert_eq!(detail.fields.len(), 3);
        for fields in detail.fields.values() {
            for value in fields.values() {
                assert!(value.confidence.ends_with('%'));
            }
        }

        assert_eq!(
            h.uploader.uploads(),
            vec![
                ("2024-05-01-a@b.com".to_string(), "2024-05-01-cedula.pdf".to_string()),
                ("2024-05-01-a@b.com".to_string(), "2024-05-01-rut.pdf".to_string()),
                ("2024-05-01-a@b.com".to_string(), "2024-05-01-camara.jpg".to_string()),
            ]
        );
        assert_eq!(
            h.extractor.calls(),
            vec!["proc-identity", "proc-tax", "proc-chamber"]
        );
        assert_eq!(h.store.folder(42).as_deref(), Some("2024-05-01-a@b.com"));
        assert!(scratch_is_empty(h.root.path()));
    }

    #[tokio::test]
    async fn existing_folder_is_reused() {
        let h = harness(
            MemorySubmissionStore::new().with_folder(42, "2023-01-15-a@b.com"),
            RecordingUploader::default(),
            ScriptedExtractor::default(),
        );

        h.workflow
            .submit_on(&AuthContext::for_tests(), complete_request(), may_first())
            .await
            .unwrap();
        h.workflow
            .submit_on(
                &AuthContext::for_tests(),
                complete_request(),
                NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
            )
            .await
            .unwrap();

        assert!(
            h.uploader
                .uploads()
                .iter()
                .all(|(folder, _)| folder == "2023-01-15-a@b.com")
        );
        assert_eq!(h.store.folder(42).as_deref(), Some("2023-01-15-a@b.com"));
    }

    #[tokio::test]
    async fn failed_extraction_degrades_only_that_category() {
        let h = harness(
            MemorySubmissionStore::new(),
            RecordingUploader::default(),
            ScriptedExtractor::failing_for(&["proc-tax"]),
        );

        let id = h
            .workflow
            .submit_on(&AuthContext::for_tests(), complete_request(), may_first())
            .await
            .unwrap();

        let detail = h.store.get(id).unwrap();
        let tax = &detail.fields["rut"];
        assert_eq!(tax.len(), 1);
        assert_eq!(tax[EXTRACTION_ERROR_FIELD].confidence, "0.00%");
        assert!(detail.fields["doc_identidad"].contains_key("nombre_archivo"));
        assert!(detail.fields["camara_comercio"].contains_key("nombre_archivo"));
    }

    #[tokio::test]
    async fn upload_failure_aborts_without_persisting() {
        let h = harness(
            MemorySubmissionStore::new(),
            RecordingUploader::failing_from(1),
            ScriptedExtractor::default(),
        );

        let err = h
            .workflow
            .submit_on(&AuthContext::for_tests(), complete_request(), may_first())
            .await
            .unwrap_err();

        assert!(matches!(err, IntakeError::Storage(_)));
        assert_eq!(h.uploader.uploads().len(), 1);
        assert_eq!(h.store.submission_count(), 0);
        assert!(h.extractor.calls().is_empty());
        assert!(scratch_is_empty(h.root.path()));
    }

    #[tokio::test]
    async fn missing_document_is_rejected_before_any_side_effect() {
        let h = default_harness();
        let mut request = complete_request();
        request.documents.remove(&DocumentCategory::TaxRegistration);
        request
            .documents
            .insert(DocumentCategory::ChamberOfCommerce, document(""));

        let err = h
            .workflow
            .submit_on(&AuthContext::for_tests(), request, may_first())
            .await
            .unwrap_err();

        match err {
            IntakeError::BadRequest(message) => {
                assert_eq!(message, format!("{MISSING_FILES_MESSAGE}: rut, camara"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(h.uploader.uploads().is_empty());
        assert!(h.store.folder(42).is_none());
    }

    #[tokio::test]
    async fn missing_identity_fields_are_rejected() {
        let h = default_harness();
        let mut request = complete_request();
        request.email = Some("   ".to_string());

        let err = h
            .workflow
            .submit_on(&AuthContext::for_tests(), request, may_first())
            .await
            .unwrap_err();
        assert!(
            matches!(err, IntakeError::BadRequest(message) if message == MISSING_IDENTITY_MESSAGE)
        );

        let mut request = complete_request();
        request.user_id = Some("cuarenta".to_string());
        let err = h
            .workflow
            .submit_on(&AuthContext::for_tests(), request, may_first())
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::BadRequest(_)));

        for zero_or_negative in ["0", "-3"] {
            let mut request = complete_request();
            request.user_id = Some(zero_or_negative.to_string());
            let err = h
                .workflow
                .submit_on(&AuthContext::for_tests(), request, may_first())
                .await
                .unwrap_err();
            assert!(
                matches!(err, IntakeError::BadRequest(message) if message == MISSING_IDENTITY_MESSAGE)
            );
        }
        assert_eq!(h.store.submission_count(), 0);
        assert_eq!(h.store.folder(0), None);
    }

    #[tokio::test]
    async fn persistence_failure_is_reported_and_scratch_cleaned() {
        let h = harness(
            MemorySubmissionStore::failing_writes(),
            RecordingUploader::default(),
            ScriptedExtractor::default(),
        );

        let err = h
            .workflow
            .submit_on(&AuthContext::for_tests(), complete_request(), may_first())
            .await
            .unwrap_err();

        assert!(matches!(err, IntakeError::Persistence(_)));
        assert_eq!(h.uploader.uploads().len(), 3);
        assert!(scratch_is_empty(h.root.path()));
    }

    #[tokio::test]
    async fn identical_file_names_do_not_collide() {
        let h = default_harness();
        let mut request = complete_request();
        for category in DocumentCategory::ALL {
            request.documents.insert(category, document("scan.pdf"));
        }

        h.workflow
            .submit_on(&AuthContext::for_tests(), request, may_first())
            .await
            .unwrap();

        let names: Vec<_> = h.uploader.uploads().into_iter().map(|(_, name)| name).collect();
        assert_eq!(
            names,
            vec![
                "2024-05-01-scan.pdf",
                "2024-05-01-scan_1.pdf",
                "2024-05-01-scan_2.pdf"
            ]
        );
    }

    #[test]
    fn folder_name_prefixes_date() {
        assert_eq!(folder_name(may_first(), "a@b.com"), "2024-05-01-a@b.com");
    }
}
