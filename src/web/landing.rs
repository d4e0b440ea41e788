use axum::response::Html;

use crate::web::templates::render_page;

pub async fn landing_page() -> Html<String> {
    Html(render_page(
        "Impocali · Recepción de documentos",
        r#"        <section class="panel">
            <h2>Servicio de recepción de documentos</h2>
            <p class="note">Este servicio recibe la documentación enviada desde el portal de autogestión
            (documento de identidad, RUT y cámara de comercio) y la deja lista para revisión.</p>
            <p class="note">El equipo de revisión puede consultar las solicitudes en <a href="/admin">el panel</a>
            con su token de acceso.</p>
        </section>"#,
    ))
}
