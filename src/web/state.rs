use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::{
    config::AppConfig,
    db::{PgSubmissionStore, SubmissionStore},
    extraction::{DocumentAiExtractor, DocumentExtractor},
    gcp::{CLOUD_PLATFORM_SCOPE, GoogleTokenSource},
    notify::{CredentialManager, FileCredentialStore, GmailNotifier, Notifier},
    secrets::SecretManagerProvider,
    session::{IntrospectionValidator, SharedSecretValidator, TokenValidator},
    storage::{GcsUploader, StorageUploader},
    workflow::{ReviewWorkflow, SubmissionWorkflow},
};

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    store: Arc<dyn SubmissionStore>,
    validator: Arc<dyn TokenValidator>,
    notifier: Arc<dyn Notifier>,
    submissions: SubmissionWorkflow,
    reviews: ReviewWorkflow,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await
            .context("failed to connect to Postgres")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;

        let http = Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        let service_tokens = GoogleTokenSource::new(
            http.clone(),
            config.service_credentials_path.as_deref(),
            CLOUD_PLATFORM_SCOPE,
        )
        .context("failed to load service credentials")?;
        let storage_tokens = match config.storage_credentials_path.as_deref() {
            Some(path) => GoogleTokenSource::new(http.clone(), Some(path), CLOUD_PLATFORM_SCOPE)
                .context("failed to load storage credentials")?,
            None => service_tokens.clone(),
        };

        let validator: Arc<dyn TokenValidator> = match &config.session_validation_url {
            Some(url) => {
                info!(%url, "validating tokens against session endpoint");
                Arc::new(IntrospectionValidator::new(http.clone(), url.clone()))
            }
            None => Arc::new(SharedSecretValidator::new(Arc::new(
                SecretManagerProvider::new(
                    http.clone(),
                    service_tokens.clone(),
                    config.project_id.clone(),
                    config.token_secret_name.clone(),
                ),
            ))),
        };

        let uploader = Arc::new(GcsUploader::new(
            http.clone(),
            storage_tokens,
            config.bucket_name.clone(),
        ));
        let extractor = Arc::new(DocumentAiExtractor::new(
            http.clone(),
            service_tokens,
            config.project_id.clone(),
            config.region.clone(),
        ));
        let credentials = CredentialManager::new(
            http.clone(),
            Arc::new(FileCredentialStore::new(config.gmail_token_path.clone())),
        );
        let notifier = Arc::new(GmailNotifier::new(
            http,
            credentials,
            config.mail_sender.clone(),
        ));

        tokio::fs::create_dir_all(&config.upload_folder)
            .await
            .with_context(|| {
                format!(
                    "failed to create upload folder {}",
                    config.upload_folder.display()
                )
            })?;

        Ok(Self::from_parts(
            config,
            Arc::new(PgSubmissionStore::new(pool)),
            validator,
            uploader,
            extractor,
            notifier,
        ))
    }

    pub fn from_parts(
        config: AppConfig,
        store: Arc<dyn SubmissionStore>,
        validator: Arc<dyn TokenValidator>,
        uploader: Arc<dyn StorageUploader>,
        extractor: Arc<dyn DocumentExtractor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let submissions = SubmissionWorkflow::new(
            store.clone(),
            uploader,
            extractor,
            config.processors.clone(),
            config.upload_folder.clone(),
        );
        let reviews = ReviewWorkflow::new(store.clone(), notifier.clone());

        Self {
            config: Arc::new(config),
            store,
            validator,
            notifier,
            submissions,
            reviews,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn SubmissionStore {
        self.store.as_ref()
    }

    pub fn validator(&self) -> &dyn TokenValidator {
        self.validator.as_ref()
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn submissions(&self) -> &SubmissionWorkflow {
        &self.submissions
    }

    pub fn reviews(&self) -> &ReviewWorkflow {
        &self.reviews
    }
}
