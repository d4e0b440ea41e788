//! Outbound email for review decisions.

mod credentials;
mod gmail;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use credentials::{CredentialManager, FileCredentialStore};
pub use gmail::GmailNotifier;

use crate::web::escape_html;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("mail credentials are invalid and cannot be refreshed; re-authentication required")]
    ReauthenticationRequired,

    #[error("mail credentials unavailable: {0}")]
    Credentials(String),

    #[error("invalid address `{0}`")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("mail API rejected message: {0}")]
    Send(String),
}

impl NotificationError {
    /// Coarse classification reported by the test-send endpoint.
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationError::ReauthenticationRequired | NotificationError::Credentials(_) => {
                "AuthError"
            }
            NotificationError::Send(_) => "HttpError",
            NotificationError::InvalidAddress(_) | NotificationError::Build(_) => "Otro",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    /// Overrides the configured sender when present.
    pub from: Option<String>,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError>;
}

pub fn approval_email(to: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        from: None,
        subject: "✅ Documentación aprobada - Impocali".to_string(),
        html: r#"<div style="font-family: Arial, sans-serif; color: #333;">
    <h2 style="color: #5cb85c;">¡Documentación Aprobada!</h2>
    <p>Hola,</p>
    <p>Nos complace informarte que tu documentación ha sido <strong>aprobada correctamente</strong>.</p>
    <p>Ya puedes continuar con los siguientes pasos desde la plataforma de autogestión.</p>
    <p style="margin-top: 20px;">Gracias,<br><strong>Equipo Impocali</strong></p>
</div>"#
            .to_string(),
    }
}

pub fn rejection_email(to: &str, reason: &str) -> OutgoingEmail {
    let reason = escape_html(reason);
    OutgoingEmail {
        to: to.to_string(),
        from: None,
        subject: "📄 Tu solicitud ha sido rechazada - Impocali".to_string(),
        html: format!(
            r#"<div style="font-family: Arial, sans-serif; color: #333;">
    <h2 style="color: #d9534f;">Solicitud Rechazada</h2>
    <p>Hola,</p>
    <p>Lamentamos informarte que tu solicitud fue <strong>rechazada</strong> por el siguiente motivo:</p>
    <blockquote style="border-left: 4px solid #d9534f; padding-left: 10px; color: #a94442;">
        {reason}
    </blockquote>
    <p>Por favor revisa la documentación y vuelve a subirla en el portal de autogestión.</p>
    <p style="margin-top: 20px;">Gracias,<br><strong>Equipo Impocali</strong></p>
</div>"#
        ),
    }
}

pub fn test_email(to: &str, from: &str, sent_at: DateTime<Utc>) -> OutgoingEmail {
    let sender = escape_html(from);
    OutgoingEmail {
        to: to.to_string(),
        from: Some(from.to_string()),
        subject: format!("Prueba desde {from} - Impocali"),
        html: format!(
            r#"<div style="font-family: Arial, sans-serif; color: #333;">
    <h2 style="color: #0b57d0;">Prueba desde: {sender}</h2>
    <p>Este es un <strong>correo de prueba</strong> desde Impocali.</p>
    <p><strong>Remitente:</strong> {sender}</p>
    <p><strong>Fecha:</strong> {date}</p>
</div>"#,
            date = sent_at.format("%Y-%m-%d %H:%M:%S"),
        ),
    }
}
