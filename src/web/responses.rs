use serde::Serialize;

/// `{"status": ..., "mensaje": ...}` payload returned by the action endpoints.
#[derive(Debug, Serialize, Clone)]
pub struct StatusMessage {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mensaje: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solicitud_id: Option<i64>,
}

impl StatusMessage {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            mensaje: None,
            solicitud_id: None,
        }
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self {
            mensaje: Some(message.into()),
            ..Self::ok()
        }
    }

    /// Partial success: the action went through but a side effect did not.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            mensaje: Some(message.into()),
            solicitud_id: None,
        }
    }

    pub fn with_submission(mut self, id: i64) -> Self {
        self.solicitud_id = Some(id);
        self
    }
}
