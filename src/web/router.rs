use std::any::Any;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::error;

use crate::{
    error::{ErrorBody, INTERNAL_ERROR_MESSAGE},
    web::{AppState, admin, auth, landing, review, submissions},
};

pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.config().max_upload_bytes;

    let api = Router::new()
        .route(
            "/subir",
            post(submissions::upload_documents).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/validar-token", get(auth::validate_token))
        .route("/probar-envio-correo", post(review::send_test_email))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    let admin = Router::new()
        .route("/admin", get(admin::admin_dashboard))
        .route("/detalle/:id", get(admin::submission_detail))
        .route("/aceptar/:id", post(review::approve_submission))
        .route("/rechazar/:id", post(review::reject_submission))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/", get(landing::landing_page))
        .route("/healthz", get(healthz))
        .merge(api)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(%detail, "handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: INTERNAL_ERROR_MESSAGE.to_string(),
        }),
    )
        .into_response()
}
