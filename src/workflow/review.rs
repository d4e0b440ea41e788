use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    db::{ReviewUpdate, SubmissionStore},
    error::{IntakeError, IntakeResult},
    notify::{Notifier, OutgoingEmail, approval_email, rejection_email},
    session::AuthContext,
};

pub const MISSING_REASON_MESSAGE: &str = "El motivo es obligatorio";
pub const SUBMISSION_NOT_FOUND_MESSAGE: &str = "Solicitud no encontrada";

/// What happened to the notification after a review decision was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    Sent,
    Failed,
    NoRecipient,
}

#[derive(Clone)]
pub struct ReviewWorkflow {
    store: Arc<dyn SubmissionStore>,
    notifier: Arc<dyn Notifier>,
}

impl ReviewWorkflow {
    pub fn new(store: Arc<dyn SubmissionStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Approves an unreviewed submission. The approval stands even when the email fails.
    pub async fn approve(&self, auth: &AuthContext, id: i64) -> IntakeResult<NotificationOutcome> {
        let update = self
            .store
            .mark_approved(id)
            .await
            .map_err(IntakeError::Persistence)?;
        ensure_updated(update, id)?;
        info!(submission_id = id, token_hint = %auth.token_hint(), "submission approved");

        Ok(self.notify(id, approval_email).await)
    }

    /// Rejects an unreviewed submission with a mandatory reason.
    pub async fn reject(
        &self,
        auth: &AuthContext,
        id: i64,
        reason: &str,
    ) -> IntakeResult<NotificationOutcome> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(IntakeError::BadRequest(MISSING_REASON_MESSAGE.to_string()));
        }

        let update = self
            .store
            .mark_rejected(id, reason)
            .await
            .map_err(IntakeError::Persistence)?;
        ensure_updated(update, id)?;
        info!(submission_id = id, token_hint = %auth.token_hint(), "submission rejected");

        Ok(self.notify(id, |to| rejection_email(to, reason)).await)
    }

    async fn notify<F>(&self, id: i64, build: F) -> NotificationOutcome
    where
        F: FnOnce(&str) -> OutgoingEmail,
    {
        let recipient = match self.store.submission_email(id).await {
            Ok(Some(recipient)) => recipient,
            Ok(None) => {
                warn!(submission_id = id, "no email on submission, skipping notification");
                return NotificationOutcome::NoRecipient;
            }
            Err(err) => {
                error!(?err, submission_id = id, "failed to look up notification recipient");
                return NotificationOutcome::Failed;
            }
        };

        match self.notifier.send(build(&recipient)).await {
            Ok(()) => NotificationOutcome::Sent,
            Err(err) => {
                error!(%err, submission_id = id, "review notification failed");
                NotificationOutcome::Failed
            }
        }
    }
}

fn ensure_updated(update: ReviewUpdate, id: i64) -> IntakeResult<()> {
    match update {
        ReviewUpdate::Updated => Ok(()),
        ReviewUpdate::NotFound => Err(IntakeError::NotFound(
            SUBMISSION_NOT_FOUND_MESSAGE.to_string(),
        )),
        ReviewUpdate::AlreadyReviewed => Err(IntakeError::AlreadyReviewed(id)),
    }
}
