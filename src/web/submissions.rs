use axum::{
    Extension, Json,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartRejection},
    },
};
use tracing::info;

use crate::{
    error::{IntakeError, IntakeResult},
    models::DocumentCategory,
    session::AuthContext,
    web::{AppState, responses::StatusMessage},
    workflow::{SubmissionRequest, UploadedDocument},
};

const SUCCESS_MESSAGE: &str = "Documentos cargados y procesados correctamente.";

/// `POST /subir`
pub async fn upload_documents(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> IntakeResult<Json<StatusMessage>> {
    let multipart = multipart.map_err(|rejection| {
        IntakeError::BadRequest(format!("Formulario inválido: {}", rejection.body_text()))
    })?;
    let request = read_submission_form(multipart).await?;
    let id = state.submissions().submit(&auth, request).await?;
    info!(submission_id = id, "upload accepted");
    Ok(Json(StatusMessage::ok_with(SUCCESS_MESSAGE).with_submission(id)))
}

/// Buffers the form. Unknown fields are ignored; the first part wins for repeated names.
async fn read_submission_form(mut multipart: Multipart) -> IntakeResult<SubmissionRequest> {
    let mut request = SubmissionRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "usuario_id" => {
                let value = field.text().await.map_err(form_error)?;
                request.user_id.get_or_insert(value);
            }
            "correo" => {
                let value = field.text().await.map_err(form_error)?;
                request.email.get_or_insert(value);
            }
            other => {
                let Some(category) = DocumentCategory::from_form_field(other) else {
                    continue;
                };
                if request.documents.contains_key(&category) {
                    continue;
                }
                let document = read_document(field).await?;
                request.documents.insert(category, document);
            }
        }
    }

    Ok(request)
}

async fn read_document(field: Field<'_>) -> IntakeResult<UploadedDocument> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let content = field.bytes().await.map_err(form_error)?;
    Ok(UploadedDocument { file_name, content })
}

fn form_error(err: axum::extract::multipart::MultipartError) -> IntakeError {
    IntakeError::BadRequest(format!("Formulario inválido: {}", err.body_text()))
}
