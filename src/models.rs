use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Review state of a submission. Stored with the Spanish spellings used by the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Unreviewed,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Unreviewed => "sin revisar",
            SubmissionStatus::Approved => "aprobado",
            SubmissionStatus::Rejected => "rechazado",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SubmissionStatus::Unreviewed => "Sin revisar",
            SubmissionStatus::Approved => "Aprobado",
            SubmissionStatus::Rejected => "Rechazado",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sin revisar" => Some(SubmissionStatus::Unreviewed),
            "aprobado" => Some(SubmissionStatus::Approved),
            "rechazado" => Some(SubmissionStatus::Rejected),
            _ => None,
        }
    }
}

impl Serialize for SubmissionStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SubmissionStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        SubmissionStatus::parse(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown status `{value}`")))
    }
}

/// The three document kinds every submission must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocumentCategory {
    IdentityDocument,
    TaxRegistration,
    ChamberOfCommerce,
}

impl DocumentCategory {
    /// Fixed processing order for uploads and extraction.
    pub const ALL: [DocumentCategory; 3] = [
        DocumentCategory::IdentityDocument,
        DocumentCategory::TaxRegistration,
        DocumentCategory::ChamberOfCommerce,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::IdentityDocument => "doc_identidad",
            DocumentCategory::TaxRegistration => "rut",
            DocumentCategory::ChamberOfCommerce => "camara_comercio",
        }
    }

    /// Multipart field name carrying this document in `POST /subir`.
    pub fn form_field(&self) -> &'static str {
        match self {
            DocumentCategory::IdentityDocument => "docIdentidad",
            DocumentCategory::TaxRegistration => "rut",
            DocumentCategory::ChamberOfCommerce => "camara",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentCategory::IdentityDocument => "Documento de identidad",
            DocumentCategory::TaxRegistration => "RUT",
            DocumentCategory::ChamberOfCommerce => "Cámara de comercio",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        DocumentCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
    }

    pub fn from_form_field(name: &str) -> Option<Self> {
        DocumentCategory::ALL
            .into_iter()
            .find(|category| category.form_field() == name)
    }
}

impl Serialize for DocumentCategory {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// One extracted value with its rendered confidence (`"97.25%"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldValue {
    pub value: String,
    pub confidence: String,
}

/// Key reserved for the soft-failure placeholder of a document.
pub const EXTRACTION_ERROR_FIELD: &str = "error";

/// Normalized field name -> value mapping for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExtractedFields {
    fields: BTreeMap<String, FieldValue>,
    #[serde(skip)]
    failed: bool,
}

impl ExtractedFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholder recorded when a document could not be analysed.
    pub fn soft_error(reason: impl Into<String>) -> Self {
        let mut fields = Self::new();
        fields.fields.insert(
            EXTRACTION_ERROR_FIELD.to_string(),
            FieldValue {
                value: reason.into(),
                confidence: format_confidence(0.0),
            },
        );
        fields.failed = true;
        fields
    }

    /// Inserts an entity, normalizing its type name. Later duplicates overwrite earlier ones.
    pub fn insert_entity(&mut self, entity_type: &str, value: impl Into<String>, confidence: f64) {
        self.fields.insert(
            normalize_field_name(entity_type),
            FieldValue {
                value: value.into(),
                confidence: format_confidence(confidence),
            },
        );
    }

    /// Reason of the soft failure, if this map is the placeholder.
    pub fn error(&self) -> Option<&str> {
        if !self.failed {
            return None;
        }
        self.fields
            .get(EXTRACTION_ERROR_FIELD)
            .map(|field| field.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }
}

/// Lower-cases an entity type and replaces spaces with underscores.
pub fn normalize_field_name(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

/// Renders a 0..=1 confidence score as a percentage with two decimals.
pub fn format_confidence(score: f64) -> String {
    let percent = if score.is_finite() {
        (score * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    format!("{percent:.2}%")
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub category: DocumentCategory,
    pub original_name: String,
    pub final_name: String,
    pub url: String,
}

/// Row shown on the admin listing.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionSummary {
    pub id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub category: DocumentCategory,
    pub name: String,
    pub url: String,
}

/// Base record plus files and fields grouped by category then field name.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionDetail {
    pub submission: Submission,
    pub files: Vec<FileRecord>,
    pub fields: BTreeMap<String, BTreeMap<String, FieldValue>>,
}
