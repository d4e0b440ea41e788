use axum::{
    Extension, Form, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::{
    error::{IntakeError, IntakeResult},
    notify::test_email,
    session::AuthContext,
    web::{AppState, responses::StatusMessage},
    workflow::NotificationOutcome,
};

const APPROVED_WITHOUT_EMAIL: &str = "La solicitud fue aprobada, pero el correo no pudo enviarse.";

#[derive(Debug, Default, Deserialize)]
pub struct RejectForm {
    #[serde(default)]
    pub motivo: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TestEmailRequest {
    pub destinatario: Option<String>,
    pub remitente: Option<String>,
}

/// `POST /aceptar/:id`
pub async fn approve_submission(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> IntakeResult<Response> {
    let outcome = state.reviews().approve(&auth, id).await?;
    Ok(match outcome {
        NotificationOutcome::Failed => (
            StatusCode::ACCEPTED,
            Json(StatusMessage::warning(APPROVED_WITHOUT_EMAIL)),
        )
            .into_response(),
        NotificationOutcome::Sent | NotificationOutcome::NoRecipient => {
            Json(StatusMessage::ok()).into_response()
        }
    })
}

/// `POST /rechazar/:id`
pub async fn reject_submission(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<i64>,
    form: Option<Form<RejectForm>>,
) -> IntakeResult<Json<StatusMessage>> {
    let form = form.map(|Form(form)| form).unwrap_or_default();
    let outcome = state.reviews().reject(&auth, id, &form.motivo).await?;
    info!(submission_id = id, ?outcome, "rejection processed");
    Ok(Json(StatusMessage::ok()))
}

/// `POST /probar-envio-correo`: sends a test message through the configured mail account.
pub async fn send_test_email(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthContext>,
    body: Option<Json<TestEmailRequest>>,
) -> IntakeResult<Response> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let recipient = body
        .destinatario
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| IntakeError::BadRequest("Falta el destinatario".to_string()))?;
    let sender = body
        .remitente
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| state.config().mail_sender.clone());

    let email = test_email(&recipient, &sender, Utc::now());
    Ok(match state.notifier().send(email).await {
        Ok(()) => Json(json!({
            "status": "ok",
            "remitente": sender,
            "destinatario": recipient,
            "mensaje": "Correo de prueba enviado",
        }))
        .into_response(),
        Err(err) => {
            error!(%err, "test email failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "tipo": err.kind(),
                    "detalle": err.to_string(),
                })),
            )
                .into_response()
        }
    })
}
