use axum::{
    Extension, Json,
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use serde::Deserialize;
use tracing::warn;

use crate::{
    error::IntakeError,
    session::{AuthContext, authorize},
    web::{AppState, responses::StatusMessage},
};

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Rejects the request with 401 unless the `Authorization: Bearer` token is accepted.
pub async fn require_bearer(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    request: Request,
    next: Next,
) -> Response {
    let token = bearer.as_ref().map(|TypedHeader(header)| header.token());
    authorize_and_run(&state, token, request, next).await
}

/// Like [`require_bearer`], but also accepts the token as the `token` query parameter.
pub async fn require_session(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    query: Option<Query<TokenQuery>>,
    request: Request,
    next: Next,
) -> Response {
    let query_token = query.and_then(|Query(query)| query.token);
    let token = bearer
        .as_ref()
        .map(|TypedHeader(header)| header.token())
        .or(query_token.as_deref());
    authorize_and_run(&state, token, request, next).await
}

async fn authorize_and_run(
    state: &AppState,
    token: Option<&str>,
    mut request: Request,
    next: Next,
) -> Response {
    match authorize(state.validator(), token).await {
        Some(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        None => {
            warn!(path = %request.uri().path(), "rejected unauthorized request");
            IntakeError::unauthorized().into_response()
        }
    }
}

pub async fn validate_token(Extension(_auth): Extension<AuthContext>) -> Json<StatusMessage> {
    Json(StatusMessage::ok())
}
