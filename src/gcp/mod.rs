//! Shared plumbing for calling Google Cloud REST endpoints.

mod auth;

pub use auth::GoogleTokenSource;

/// Scope requested for Secret Manager, Cloud Storage and Document AI calls.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Trims a response body for inclusion in error messages.
pub(crate) fn body_preview(body: &str) -> String {
    const LIMIT: usize = 500;
    if body.len() > LIMIT {
        let mut end = LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
