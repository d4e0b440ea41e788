mod review;
mod scratch;
mod submission;

pub use review::{NotificationOutcome, ReviewWorkflow};
pub use submission::{SubmissionRequest, SubmissionWorkflow, UploadedDocument};
