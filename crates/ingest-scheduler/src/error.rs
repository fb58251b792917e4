use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] ingest_store::StoreError),

    #[error(transparent)]
    Secrets(#[from] ingest_secrets::SecretsError),

    #[error(transparent)]
    Plugin(#[from] ingest_plugin::PluginError),
}
