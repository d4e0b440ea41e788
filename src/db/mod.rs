mod postgres;

#[cfg(test)]
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

pub use postgres::PgSubmissionStore;

use crate::models::{
    DocumentCategory, ExtractedFields, StoredFile, SubmissionDetail, SubmissionSummary,
};

/// Everything written for one accepted upload.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub user_id: i64,
    pub email: String,
    pub files: Vec<StoredFile>,
    pub extracted: Vec<(DocumentCategory, ExtractedFields)>,
}

/// Result of a conditional review update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewUpdate {
    Updated,
    NotFound,
    AlreadyReviewed,
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn folder_for_user(&self, user_id: i64) -> Result<Option<String>>;

    /// Stores `folder` for the user unless one is already set; returns the folder in effect.
    async fn assign_folder_if_absent(&self, user_id: i64, email: &str, folder: &str)
    -> Result<String>;

    /// Writes the submission, its files and its extracted fields as one unit.
    async fn create_submission(&self, submission: NewSubmission) -> Result<i64>;

    /// Newest first.
    async fn list_submissions(&self) -> Result<Vec<SubmissionSummary>>;

    async fn submission_detail(&self, id: i64) -> Result<Option<SubmissionDetail>>;

    /// Recipient for review notifications, if the submission has one.
    async fn submission_email(&self, id: i64) -> Result<Option<String>>;

    /// Only applies to unreviewed submissions.
    async fn mark_approved(&self, id: i64) -> Result<ReviewUpdate>;

    /// Only applies to unreviewed submissions.
    async fn mark_rejected(&self, id: i64, reason: &str) -> Result<ReviewUpdate>;
}
