//! In-process store used by the workflow and router tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;

use super::{NewSubmission, ReviewUpdate, SubmissionStore};
use crate::models::{
    FileRecord, Submission, SubmissionDetail, SubmissionStatus, SubmissionSummary,
};

#[derive(Default)]
struct Tables {
    folders: HashMap<i64, String>,
    submissions: Vec<SubmissionDetail>,
}

#[derive(Default)]
pub struct MemorySubmissionStore {
    tables: Mutex<Tables>,
    fail_writes: bool,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `create_submission` always fails.
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn with_folder(self, user_id: i64, folder: &str) -> Self {
        self.tables
            .lock()
            .unwrap()
            .folders
            .insert(user_id, folder.to_string());
        self
    }

    /// Inserts an already-built submission, returning its id.
    pub fn seed(&self, user_id: i64, email: &str, status: SubmissionStatus) -> i64 {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.submissions.len() as i64 + 1;
        tables.submissions.push(SubmissionDetail {
            submission: Submission {
                id,
                user_id,
                email: email.to_string(),
                created_at: Utc::now(),
                status,
                rejection_reason: None,
            },
            files: Vec::new(),
            fields: BTreeMap::new(),
        });
        id
    }

    pub fn submission_count(&self) -> usize {
        self.tables.lock().unwrap().submissions.len()
    }

    pub fn get(&self, id: i64) -> Option<SubmissionDetail> {
        self.tables
            .lock()
            .unwrap()
            .submissions
            .iter()
            .find(|detail| detail.submission.id == id)
            .cloned()
    }

    pub fn folder(&self, user_id: i64) -> Option<String> {
        self.tables.lock().unwrap().folders.get(&user_id).cloned()
    }

    fn review(&self, id: i64, status: SubmissionStatus, reason: Option<&str>) -> ReviewUpdate {
        let mut tables = self.tables.lock().unwrap();
        let Some(detail) = tables
            .submissions
            .iter_mut()
            .find(|detail| detail.submission.id == id)
        else {
            return ReviewUpdate::NotFound;
        };
        if detail.submission.status != SubmissionStatus::Unreviewed {
            return ReviewUpdate::AlreadyReviewed;
        }
        detail.submission.status = status;
        detail.submission.rejection_reason = reason.map(str::to_string);
        ReviewUpdate::Updated
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn folder_for_user(&self, user_id: i64) -> Result<Option<String>> {
        Ok(self.folder(user_id))
    }

    async fn assign_folder_if_absent(
        &self,
        user_id: i64,
        _email: &str,
        folder: &str,
    ) -> Result<String> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables
            .folders
            .entry(user_id)
            .or_insert_with(|| folder.to_string())
            .clone())
    }

    async fn create_submission(&self, submission: NewSubmission) -> Result<i64> {
        if self.fail_writes {
            return Err(anyhow!("connection reset"));
        }
        let mut tables = self.tables.lock().unwrap();
        let id = tables.submissions.len() as i64 + 1;

        let mut fields = BTreeMap::new();
        for (category, extracted) in &submission.extracted {
            let entry: &mut BTreeMap<_, _> =
                fields.entry(category.as_str().to_string()).or_default();
            for (name, value) in extracted.iter() {
                entry.insert(name.clone(), value.clone());
            }
        }

        tables.submissions.push(SubmissionDetail {
            submission: Submission {
                id,
                user_id: submission.user_id,
                email: submission.email,
                created_at: Utc::now(),
                status: SubmissionStatus::Unreviewed,
                rejection_reason: None,
            },
            files: submission
                .files
                .into_iter()
                .map(|file| FileRecord {
                    category: file.category,
                    name: file.final_name,
                    url: file.url,
                })
                .collect(),
            fields,
        });
        Ok(id)
    }

    async fn list_submissions(&self) -> Result<Vec<SubmissionSummary>> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<_> = tables
            .submissions
            .iter()
            .map(|detail| SubmissionSummary {
                id: detail.submission.id,
                user_id: detail.submission.user_id,
                created_at: detail.submission.created_at,
                status: detail.submission.status,
                email: Some(detail.submission.email.clone()),
            })
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn submission_detail(&self, id: i64) -> Result<Option<SubmissionDetail>> {
        Ok(self.get(id))
    }

    async fn submission_email(&self, id: i64) -> Result<Option<String>> {
        Ok(self
            .get(id)
            .map(|detail| detail.submission.email)
            .filter(|email| !email.trim().is_empty()))
    }

    async fn mark_approved(&self, id: i64) -> Result<ReviewUpdate> {
        Ok(self.review(id, SubmissionStatus::Approved, None))
    }

    async fn mark_rejected(&self, id: i64, reason: &str) -> Result<ReviewUpdate> {
        Ok(self.review(id, SubmissionStatus::Rejected, Some(reason)))
    }
}
