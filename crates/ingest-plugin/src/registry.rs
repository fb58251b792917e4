use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::PluginError;
use crate::source::{PluginMeta, Source};

/// Process-wide, concurrent-access table mapping `plugin_id -> source`.
///
/// Constructed explicitly at startup and passed into the scheduler and HTTP
/// layer as `Arc<PluginRegistry>` — there is no process-global singleton.
#[derive(Default)]
pub struct PluginRegistry {
    sources: RwLock<HashMap<String, Arc<dyn Source>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under its own `meta().id`. Fails if that id is
    /// already registered.
    pub async fn register(&self, source: Arc<dyn Source>) -> Result<(), PluginError> {
        let id = source.meta().id;
        let mut guard = self.sources.write().await;
        if guard.contains_key(&id) {
            return Err(PluginError::AlreadyRegistered(id));
        }
        guard.insert(id, source);
        Ok(())
    }

    /// Look up the source implementation for `id`.
    pub async fn get_source(&self, id: &str) -> Result<Arc<dyn Source>, PluginError> {
        self.sources
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(id.to_string()))
    }

    /// List the metadata of every registered plugin, for the `GET /plugins`
    /// surface.
    pub async fn list(&self) -> Vec<PluginMeta> {
        self.sources.read().await.values().map(|s| s.meta()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::DemoSource;

    #[tokio::test]
    async fn register_and_get() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(DemoSource::new())).await.unwrap();
        let source = registry.get_source("demo").await.unwrap();
        assert_eq!(source.meta().id, "demo");
    }

    #[tokio::test]
    async fn duplicate_register_fails() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(DemoSource::new())).await.unwrap();
        let err = registry.register(Arc::new(DemoSource::new())).await.unwrap_err();
        assert!(matches!(err, PluginError::AlreadyRegistered(id) if id == "demo"));
    }

    #[tokio::test]
    async fn missing_plugin_not_found() {
        let registry = PluginRegistry::new();
        assert!(matches!(registry.get_source("nope").await, Err(PluginError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_returns_all_metas() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(DemoSource::new())).await.unwrap();
        assert_eq!(registry.list().await.len(), 1);
    }
}
