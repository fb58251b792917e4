use ingest_domain::FieldError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config validation failed")]
    Validation(Vec<FieldError>),

    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid value for environment variable {var}: {message}")]
    InvalidEnv { var: String, message: String },
}

impl ConfigError {
    pub fn errors(&self) -> &[FieldError] {
        match self {
            ConfigError::Validation(errs) => errs,
            _ => &[],
        }
    }
}
