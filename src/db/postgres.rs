use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::info;

use super::{NewSubmission, ReviewUpdate, SubmissionStore};
use crate::models::{
    DocumentCategory, FieldValue, FileRecord, Submission, SubmissionDetail, SubmissionStatus,
    SubmissionSummary,
};

#[derive(Clone, FromRow)]
struct SummaryRow {
    id: i64,
    usuario_id: i64,
    fecha: DateTime<Utc>,
    estado: String,
    correo: Option<String>,
}

#[derive(Clone, FromRow)]
struct SubmissionRow {
    id: i64,
    usuario_id: i64,
    correo: String,
    fecha: DateTime<Utc>,
    estado: String,
    motivo_rechazo: Option<String>,
}

#[derive(Clone, FromRow)]
struct FileRow {
    tipo: String,
    nombre_archivo: String,
    ruta_archivo: String,
}

#[derive(Clone, FromRow)]
struct FieldRow {
    tipo_documento: String,
    campo: String,
    valor: String,
    confianza: String,
}

fn parse_status(raw: &str) -> Result<SubmissionStatus> {
    SubmissionStatus::parse(raw).ok_or_else(|| anyhow!("unknown submission status `{raw}`"))
}

fn parse_category(raw: &str) -> Result<DocumentCategory> {
    DocumentCategory::parse(raw).ok_or_else(|| anyhow!("unknown document category `{raw}`"))
}

impl TryFrom<SummaryRow> for SubmissionSummary {
    type Error = anyhow::Error;

    fn try_from(row: SummaryRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.usuario_id,
            created_at: row.fecha,
            status: parse_status(&row.estado)?,
            email: row.correo,
        })
    }
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = anyhow::Error;

    fn try_from(row: SubmissionRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.usuario_id,
            email: row.correo,
            created_at: row.fecha,
            status: parse_status(&row.estado)?,
            rejection_reason: row.motivo_rechazo,
        })
    }
}

/// Groups field rows by document category, then field name.
fn group_fields(rows: Vec<FieldRow>) -> BTreeMap<String, BTreeMap<String, FieldValue>> {
    let mut grouped: BTreeMap<String, BTreeMap<String, FieldValue>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.tipo_documento).or_default().insert(
            row.campo,
            FieldValue {
                value: row.valor,
                confidence: row.confianza,
            },
        );
    }
    grouped
}

#[derive(Clone)]
pub struct PgSubmissionStore {
    pool: PgPool,
}

impl PgSubmissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn review_miss(&self, id: i64) -> Result<ReviewUpdate> {
        let current: Option<String> =
            sqlx::query_scalar("SELECT estado FROM solicitudes WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("failed to read submission status")?;

        Ok(match current {
            Some(_) => ReviewUpdate::AlreadyReviewed,
            None => ReviewUpdate::NotFound,
        })
    }
}

#[async_trait]
impl SubmissionStore for PgSubmissionStore {
    async fn folder_for_user(&self, user_id: i64) -> Result<Option<String>> {
        let folder: Option<Option<String>> =
            sqlx::query_scalar("SELECT carpeta_gcs FROM usuarios WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .context("failed to read user folder")?;
        Ok(folder.flatten().filter(|folder| !folder.is_empty()))
    }

    async fn assign_folder_if_absent(
        &self,
        user_id: i64,
        email: &str,
        folder: &str,
    ) -> Result<String> {
        sqlx::query_scalar::<_, String>(
            "INSERT INTO usuarios (id, correo, carpeta_gcs) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE
             SET carpeta_gcs = COALESCE(NULLIF(usuarios.carpeta_gcs, ''), EXCLUDED.carpeta_gcs)
             RETURNING carpeta_gcs",
        )
        .bind(user_id)
        .bind(email)
        .bind(folder)
        .fetch_one(&self.pool)
        .await
        .context("failed to assign user folder")
    }

    async fn create_submission(&self, submission: NewSubmission) -> Result<i64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open transaction")?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO solicitudes (usuario_id, fecha, estado, correo)
             VALUES ($1, NOW(), $2, $3) RETURNING id",
        )
        .bind(submission.user_id)
        .bind(SubmissionStatus::Unreviewed.as_str())
        .bind(&submission.email)
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert submission")?;

        for file in &submission.files {
            sqlx::query(
                "INSERT INTO archivos (solicitud_id, tipo, nombre_archivo, ruta_archivo)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(id)
            .bind(file.category.as_str())
            .bind(&file.final_name)
            .bind(&file.url)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to insert file {}", file.final_name))?;
        }

        let mut field_count = 0usize;
        for (category, fields) in &submission.extracted {
            for (name, field) in fields.iter() {
                sqlx::query(
                    "INSERT INTO datos_extraidos (solicitud_id, tipo_documento, campo, valor, confianza)
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(id)
                .bind(category.as_str())
                .bind(name)
                .bind(&field.value)
                .bind(&field.confidence)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to insert field {name}"))?;
                field_count += 1;
            }
        }

        tx.commit().await.context("failed to commit submission")?;
        info!(
            submission_id = id,
            user_id = submission.user_id,
            files = submission.files.len(),
            fields = field_count,
            "submission stored"
        );
        Ok(id)
    }

    async fn list_submissions(&self) -> Result<Vec<SubmissionSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT s.id, s.usuario_id, s.fecha, s.estado, COALESCE(u.correo, s.correo) AS correo
             FROM solicitudes s
             LEFT JOIN usuarios u ON s.usuario_id = u.id
             ORDER BY s.fecha DESC, s.id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list submissions")?;

        rows.into_iter().map(SubmissionSummary::try_from).collect()
    }

    async fn submission_detail(&self, id: i64) -> Result<Option<SubmissionDetail>> {
        let Some(row) = sqlx::query_as::<_, SubmissionRow>(
            "SELECT id, usuario_id, correo, fecha, estado, motivo_rechazo
             FROM solicitudes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load submission")?
        else {
            return Ok(None);
        };

        let files = sqlx::query_as::<_, FileRow>(
            "SELECT tipo, nombre_archivo, ruta_archivo FROM archivos
             WHERE solicitud_id = $1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load submission files")?
        .into_iter()
        .map(|row| {
            Ok(FileRecord {
                category: parse_category(&row.tipo)?,
                name: row.nombre_archivo,
                url: row.ruta_archivo,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        let fields = sqlx::query_as::<_, FieldRow>(
            "SELECT tipo_documento, campo, valor, confianza FROM datos_extraidos
             WHERE solicitud_id = $1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load extracted fields")?;

        Ok(Some(SubmissionDetail {
            submission: Submission::try_from(row)?,
            files,
            fields: group_fields(fields),
        }))
    }

    async fn submission_email(&self, id: i64) -> Result<Option<String>> {
        let email: Option<String> =
            sqlx::query_scalar("SELECT correo FROM solicitudes WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("failed to read submission email")?;
        Ok(email.filter(|email| !email.trim().is_empty()))
    }

    async fn mark_approved(&self, id: i64) -> Result<ReviewUpdate> {
        let result = sqlx::query(
            "UPDATE solicitudes SET estado = $2 WHERE id = $1 AND estado = $3",
        )
        .bind(id)
        .bind(SubmissionStatus::Approved.as_str())
        .bind(SubmissionStatus::Unreviewed.as_str())
        .execute(&self.pool)
        .await
        .context("failed to approve submission")?;

        if result.rows_affected() == 1 {
            return Ok(ReviewUpdate::Updated);
        }
        self.review_miss(id).await
    }

    async fn mark_rejected(&self, id: i64, reason: &str) -> Result<ReviewUpdate> {
        let result = sqlx::query(
            "UPDATE solicitudes SET estado = $2, motivo_rechazo = $4
             WHERE id = $1 AND estado = $3",
        )
        .bind(id)
        .bind(SubmissionStatus::Rejected.as_str())
        .bind(SubmissionStatus::Unreviewed.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await
        .context("failed to reject submission")?;

        if result.rows_affected() == 1 {
            return Ok(ReviewUpdate::Updated);
        }
        self.review_miss(id).await
    }
}
