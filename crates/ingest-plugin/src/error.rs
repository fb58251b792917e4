use ingest_domain::FieldError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("no plugin registered for id '{0}'")]
    NotFound(String),

    #[error("config validation failed")]
    ConfigInvalid(Vec<FieldError>),

    #[error("discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("discovery cancelled")]
    Cancelled,
}
