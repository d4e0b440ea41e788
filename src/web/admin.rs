use axum::{
    extract::{Path, State},
    response::Html,
};

use crate::{
    error::{IntakeError, IntakeResult},
    models::{
        DocumentCategory, EXTRACTION_ERROR_FIELD, SubmissionDetail, SubmissionStatus,
        SubmissionSummary,
    },
    web::{AppState, escape_html, templates::render_page},
};

const REVIEW_SCRIPT: &str = r#"
<script>
(function () {
    const token = new URLSearchParams(window.location.search).get("token") || "";
    const statusBox = document.getElementById("review-status");
    async function send(url, body) {
        const options = { method: "POST", headers: { "Authorization": "Bearer " + token } };
        if (body) {
            options.headers["Content-Type"] = "application/x-www-form-urlencoded";
            options.body = body;
        }
        const response = await fetch(url, options);
        const payload = await response.json().catch(() => ({}));
        statusBox.textContent = payload.mensaje || payload.error || (response.ok ? "Listo" : "Error");
        if (response.ok) { setTimeout(() => window.location.reload(), 800); }
    }
    document.querySelectorAll("[data-approve]").forEach((button) => {
        button.addEventListener("click", () => send("/aceptar/" + button.dataset.approve));
    });
    document.querySelectorAll("[data-reject]").forEach((button) => {
        button.addEventListener("click", () => {
            const reason = document.getElementById("motivo").value;
            send("/rechazar/" + button.dataset.reject, new URLSearchParams({ motivo: reason }).toString());
        });
    });
})();
</script>
"#;

/// `GET /admin`
pub async fn admin_dashboard(State(state): State<AppState>) -> IntakeResult<Html<String>> {
    let submissions = state
        .store()
        .list_submissions()
        .await
        .map_err(IntakeError::Persistence)?;
    Ok(Html(render_dashboard(&submissions)))
}

/// `GET /detalle/:id`
pub async fn submission_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> IntakeResult<Html<String>> {
    let detail = state
        .store()
        .submission_detail(id)
        .await
        .map_err(IntakeError::Persistence)?
        .ok_or_else(|| IntakeError::NotFound("Solicitud no encontrada".to_string()))?;
    Ok(Html(render_detail(&detail)))
}

fn status_tag(status: SubmissionStatus) -> String {
    let class = match status {
        SubmissionStatus::Unreviewed => "pending",
        SubmissionStatus::Approved => "approved",
        SubmissionStatus::Rejected => "rejected",
    };
    format!(
        r#"<span class="status-tag {class}">{}</span>"#,
        status.label()
    )
}

fn render_dashboard(submissions: &[SubmissionSummary]) -> String {
    let rows = if submissions.is_empty() {
        r#"<tr><td colspan="5">No hay solicitudes registradas.</td></tr>"#.to_string()
    } else {
        submissions
            .iter()
            .map(|submission| {
                format!(
                    r#"<tr><td><a class="detail-link" href="/detalle/{id}">#{id}</a></td><td>{date}</td><td>{user}</td><td>{email}</td><td>{status}</td></tr>"#,
                    id = submission.id,
                    date = submission.created_at.format("%Y-%m-%d %H:%M"),
                    user = submission.user_id,
                    email = escape_html(submission.email.as_deref().unwrap_or("-")),
                    status = status_tag(submission.status),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let body = format!(
        r#"        <section class="panel">
            <h2>Solicitudes</h2>
            <table>
                <thead><tr><th>ID</th><th>Fecha</th><th>Usuario</th><th>Correo</th><th>Estado</th></tr></thead>
                <tbody>
{rows}
                </tbody>
            </table>
        </section>
        <script>
            document.querySelectorAll("a.detail-link").forEach((link) => {{
                const token = new URLSearchParams(window.location.search).get("token");
                if (token) {{ link.href += "?token=" + encodeURIComponent(token); }}
            }});
        </script>"#
    );
    render_page("Panel de revisión", &body)
}

fn render_detail(detail: &SubmissionDetail) -> String {
    let submission = &detail.submission;

    let files = if detail.files.is_empty() {
        "<li>Sin archivos.</li>".to_string()
    } else {
        detail
            .files
            .iter()
            .map(|file| {
                format!(
                    r#"<li>{label}: <a href="{url}" target="_blank" rel="noopener">{name}</a></li>"#,
                    label = file.category.label(),
                    url = escape_html(&file.url),
                    name = escape_html(&file.name),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let fields = detail
        .fields
        .iter()
        .map(|(category, fields)| {
            let label = DocumentCategory::parse(category)
                .map(|category| category.label().to_string())
                .unwrap_or_else(|| escape_html(category));
            let rows = fields
                .iter()
                .map(|(name, field)| {
                    let class = if name == EXTRACTION_ERROR_FIELD {
                        r#" class="field-error""#
                    } else {
                        ""
                    };
                    format!(
                        "<tr{class}><td>{}</td><td>{}</td><td>{}</td></tr>",
                        escape_html(name),
                        escape_html(&field.value),
                        escape_html(&field.confidence),
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                r#"            <h3>{label}</h3>
            <table>
                <thead><tr><th>Campo</th><th>Valor</th><th>Confianza</th></tr></thead>
                <tbody>
{rows}
                </tbody>
            </table>"#
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let reason = submission
        .rejection_reason
        .as_deref()
        .map(|reason| format!("<p><strong>Motivo:</strong> {}</p>", escape_html(reason)))
        .unwrap_or_default();

    let actions = if submission.status == SubmissionStatus::Unreviewed {
        format!(
            r#"        <section class="panel">
            <h2>Revisión</h2>
            <button class="approve" data-approve="{id}">Aprobar</button>
            <label for="motivo">Motivo de rechazo</label>
            <textarea id="motivo" name="motivo"></textarea>
            <button class="reject" data-reject="{id}">Rechazar</button>
            <div id="review-status" class="status-box"></div>
        </section>
{REVIEW_SCRIPT}"#,
            id = submission.id,
        )
    } else {
        String::new()
    };

    let body = format!(
        r#"        <section class="panel">
            <h2>Solicitud #{id}</h2>
            <p><strong>Usuario:</strong> {user}</p>
            <p><strong>Correo:</strong> {email}</p>
            <p><strong>Fecha:</strong> {date}</p>
            <p><strong>Estado:</strong> {status}</p>
            {reason}
        </section>
        <section class="panel">
            <h2>Archivos</h2>
            <ul>
{files}
            </ul>
        </section>
        <section class="panel">
            <h2>Datos extraídos</h2>
{fields}
        </section>
{actions}"#,
        id = submission.id,
        user = submission.user_id,
        email = escape_html(&submission.email),
        date = submission.created_at.format("%Y-%m-%d %H:%M"),
        status = status_tag(submission.status),
    );
    render_page(&format!("Solicitud #{}", submission.id), &body)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::models::{FieldValue, FileRecord, Submission};

    fn detail(status: SubmissionStatus) -> SubmissionDetail {
        let mut rut = BTreeMap::new();
        rut.insert(
            EXTRACTION_ERROR_FIELD.to_string(),
            FieldValue {
                value: "Formato no soportado (image/gif): <bad>".to_string(),
                confidence: "0.00%".to_string(),
            },
        );
        let mut fields = BTreeMap::new();
        fields.insert("rut".to_string(), rut);

        SubmissionDetail {
            submission: Submission {
                id: 7,
                user_id: 42,
                email: "a@b.com".to_string(),
                created_at: Utc::now(),
                status,
                rejection_reason: None,
            },
            files: vec![FileRecord {
                category: DocumentCategory::TaxRegistration,
                name: "2024-05-01-rut.pdf".to_string(),
                url: "https://storage.googleapis.com/b/f/2024-05-01-rut.pdf".to_string(),
            }],
            fields,
        }
    }

    #[test]
    fn detail_escapes_extracted_values() {
        let page = render_detail(&detail(SubmissionStatus::Unreviewed));
        assert!(page.contains("&lt;bad&gt;"));
        assert!(page.contains("field-error"));
        assert!(page.contains(r#"data-approve="7""#));
    }

    #[test]
    fn reviewed_detail_hides_actions() {
        let page = render_detail(&detail(SubmissionStatus::Approved));
        assert!(!page.contains("data-approve"));
    }

    #[test]
    fn empty_dashboard_says_so() {
        assert!(render_dashboard(&[]).contains("No hay solicitudes registradas."));
    }
}
