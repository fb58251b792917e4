use std::sync::Arc;

use ingest_plugin::PluginRegistry;
use ingest_secrets::Encryptor;
use ingest_store::{CatalogSink, RunStore, ScheduleStore};

#[derive(Clone)]
pub struct AppState {
    pub schedule_store: Arc<dyn ScheduleStore>,
    pub run_store: Arc<dyn RunStore>,
    pub catalog: Arc<dyn CatalogSink>,
    pub registry: Arc<PluginRegistry>,
    pub encryptor: Option<Arc<Encryptor>>,
    pub auth_token: Arc<String>,
}
