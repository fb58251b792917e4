use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid mrn: {0}")]
    InvalidMrn(String),

    #[error("invalid schedule name: {0}")]
    InvalidScheduleName(String),

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCronExpression { expr: String, reason: String },

    #[error("config validation failed: {0:?}")]
    ConfigInvalid(Vec<FieldError>),
}

/// A single validation failure, addressed by its dotted JSON path from the
/// config root (e.g. `credentials.region`, `external_links[0].url`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}
