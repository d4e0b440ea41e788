use chrono::{Datelike, Utc};

const PAGE_STYLES: &str = r#"
        :root { color-scheme: light; }
        body { font-family: "Helvetica Neue", Arial, sans-serif; margin: 0; background: #f8fafc; color: #0f172a; }
        header { background: #ffffff; padding: 1.5rem; border-bottom: 1px solid #e2e8f0; }
        header h1 { margin: 0; font-size: 1.5rem; }
        main { padding: 2rem 1.5rem; max-width: 1080px; margin: 0 auto; box-sizing: border-box; }
        .panel { background: #ffffff; border-radius: 12px; border: 1px solid #e2e8f0; padding: 1.5rem; box-shadow: 0 18px 40px rgba(15, 23, 42, 0.08); margin-bottom: 2rem; }
        .panel h2 { margin-top: 0; }
        table { width: 100%; border-collapse: collapse; background: #ffffff; }
        th, td { padding: 0.65rem 0.85rem; border-bottom: 1px solid #e2e8f0; text-align: left; font-size: 0.92rem; }
        th { background: #f1f5f9; font-weight: 600; }
        a { color: #2563eb; text-decoration: none; font-weight: 600; }
        a:hover { text-decoration: underline; }
        button { padding: 0.55rem 1rem; border: none; border-radius: 8px; color: #ffffff; font-weight: 600; cursor: pointer; margin-right: 0.5rem; }
        button.approve { background: #16a34a; }
        button.reject { background: #dc2626; }
        textarea { width: 100%; min-height: 4rem; border-radius: 8px; border: 1px solid #cbd5f5; padding: 0.6rem; box-sizing: border-box; margin: 0.5rem 0 1rem; }
        .status-tag { display: inline-flex; padding: 0.2rem 0.7rem; border-radius: 999px; font-size: 0.85rem; font-weight: 600; }
        .status-tag.pending { background: #fef3c7; color: #92400e; }
        .status-tag.approved { background: #dcfce7; color: #166534; }
        .status-tag.rejected { background: #fee2e2; color: #b91c1c; }
        .field-error { color: #b91c1c; }
        .note { color: #475569; font-size: 0.95rem; line-height: 1.6; }
        .status-box { margin-top: 1rem; min-height: 1.5rem; color: #0f172a; }
        .app-footer { margin-top: 3rem; text-align: center; font-size: 0.85rem; color: #94a3b8; }
"#;

/// Wraps `body_html` in the shared page shell. `title` is escaped here.
pub fn render_page(title: &str, body_html: &str) -> String {
    let title = escape_html(title);
    format!(
        r#"<!DOCTYPE html>
<html lang="es">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="robots" content="noindex,nofollow">
    <style>{styles}</style>
</head>
<body>
    <header><h1>{title}</h1></header>
    <main>
{body_html}
        {footer}
    </main>
</body>
</html>"#,
        styles = PAGE_STYLES,
        footer = render_footer(),
    )
}

pub fn render_footer() -> String {
    let current_year = Utc::now().year();
    format!(
        r#"<footer class="app-footer">© 2024-{year} Impocali, uso interno</footer>"#,
        year = current_year
    )
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
