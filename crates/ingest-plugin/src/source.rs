use async_trait::async_trait;
use ingest_domain::{ConfigSpec, DiscoveryResult};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::PluginError;

/// Static description of a registered plugin, surfaced to operators via
/// `GET /plugins`.
#[derive(Debug, Clone, Serialize)]
pub struct PluginMeta {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub config_spec: ConfigSpec,
}

/// The interface every source plugin must satisfy.
///
/// `validate` is pure and must be safe to call repeatedly; `discover` may do
/// I/O, must honor cancellation, and must be restartable — idempotency for a
/// restarted discovery is provided by the catalog/checkpoint layer, not here.
#[async_trait]
pub trait Source: Send + Sync + 'static {
    fn meta(&self) -> PluginMeta;

    /// Validate and (if valid) return the typed config derived from `raw`.
    fn validate(&self, raw: &Value) -> Result<Value, PluginError>;

    /// Discover assets, lineage, documentation, statistics, and run history.
    async fn discover(&self, ctx: CancellationToken, typed: &Value) -> Result<DiscoveryResult, PluginError>;
}
