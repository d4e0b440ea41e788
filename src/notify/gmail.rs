use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use lettre::{
    Message,
    message::{Mailbox, header::ContentType},
};
use reqwest::Client;
use serde_json::json;
use tracing::info;

use super::{CredentialManager, NotificationError, Notifier, OutgoingEmail};
use crate::gcp::body_preview;

const SEND_ENDPOINT: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

/// Sends HTML mail through the Gmail API on behalf of the authorized user.
#[derive(Clone)]
pub struct GmailNotifier {
    http: Client,
    credentials: CredentialManager,
    default_sender: String,
}

impl GmailNotifier {
    pub fn new(
        http: Client,
        credentials: CredentialManager,
        default_sender: impl Into<String>,
    ) -> Self {
        Self {
            http,
            credentials,
            default_sender: default_sender.into(),
        }
    }
}

#[async_trait]
impl Notifier for GmailNotifier {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError> {
        let raw = encode_raw_message(&email, &self.default_sender)?;
        let credentials = self.credentials.refresh_if_needed().await?;
        let access_token = credentials
            .access_token
            .ok_or(NotificationError::ReauthenticationRequired)?;

        let response = self
            .http
            .post(SEND_ENDPOINT)
            .bearer_auth(access_token)
            .json(&json!({ "raw": raw }))
            .send()
            .await
            .map_err(|err| NotificationError::Send(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Send(format!(
                "status {status}: {}",
                body_preview(&body)
            )));
        }

        info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

/// RFC 5322 message, base64url-encoded as the mail API expects in `raw`.
fn encode_raw_message(
    email: &OutgoingEmail,
    default_sender: &str,
) -> Result<String, NotificationError> {
    let sender = email.from.as_deref().unwrap_or(default_sender);
    let from: Mailbox = sender
        .parse()
        .map_err(|_| NotificationError::InvalidAddress(sender.to_string()))?;
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|_| NotificationError::InvalidAddress(email.to.clone()))?;

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_HTML)
        .body(email.html.clone())
        .map_err(|err| NotificationError::Build(err.to_string()))?;

    Ok(URL_SAFE.encode(message.formatted()))
}
