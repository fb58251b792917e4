use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ingest_domain::{Asset, Documentation, LineageEdge};
use tokio::sync::RwLock;

use crate::error::StoreError;

/// The catalog-side surface the worker calls to persist discovered entities.
///
/// Implemented outside this core (the catalog owns its own asset/lineage
/// persistence); [`InMemoryCatalog`] ships as a reference sink for tests and
/// for demo deployments that don't have a real catalog wired up. Writes are
/// idempotent on MRN: `create_asset` on an existing MRN updates in place
/// rather than erroring, matching the diff engine's self-healing design.
#[async_trait]
pub trait CatalogSink: Send + Sync {
    async fn create_asset(&self, asset: Asset) -> Result<(), StoreError>;
    async fn update_asset(&self, mrn: &str, asset: Asset) -> Result<(), StoreError>;
    async fn get_asset(&self, mrn: &str) -> Result<Option<Asset>, StoreError>;
    async fn delete_by_mrn(&self, mrn: &str) -> Result<(), StoreError>;

    async fn upsert_lineage(&self, edge: LineageEdge) -> Result<(), StoreError>;
    async fn delete_lineage(&self, mrn: &str) -> Result<(), StoreError>;

    async fn upsert_documentation(&self, doc: Documentation) -> Result<(), StoreError>;
    async fn delete_documentation(&self, mrn: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Inner {
    assets: HashMap<String, Asset>,
    lineage: HashMap<String, LineageEdge>,
    documentation: HashMap<String, Documentation>,
}

/// In-memory catalog keyed by MRN. `delete_by_mrn`/`delete_lineage`/
/// `delete_documentation` tolerate deleting an MRN that was never written.
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn asset_count(&self) -> usize {
        self.inner.read().await.assets.len()
    }
}

#[async_trait]
impl CatalogSink for InMemoryCatalog {
    async fn create_asset(&self, asset: Asset) -> Result<(), StoreError> {
        let mrn = asset.canonical_mrn().as_str().to_string();
        self.inner.write().await.assets.insert(mrn, asset);
        Ok(())
    }

    async fn update_asset(&self, mrn: &str, asset: Asset) -> Result<(), StoreError> {
        self.inner.write().await.assets.insert(mrn.to_string(), asset);
        Ok(())
    }

    async fn get_asset(&self, mrn: &str) -> Result<Option<Asset>, StoreError> {
        Ok(self.inner.read().await.assets.get(mrn).cloned())
    }

    async fn delete_by_mrn(&self, mrn: &str) -> Result<(), StoreError> {
        self.inner.write().await.assets.remove(mrn);
        Ok(())
    }

    async fn upsert_lineage(&self, edge: LineageEdge) -> Result<(), StoreError> {
        let mrn = ingest_domain::Mrn::lineage(
            &edge.edge_type,
            &ingest_domain::Mrn::new_from_string(&edge.source_mrn),
            &ingest_domain::Mrn::new_from_string(&edge.target_mrn),
        );
        self.inner.write().await.lineage.insert(mrn.as_str().to_string(), edge);
        Ok(())
    }

    async fn delete_lineage(&self, mrn: &str) -> Result<(), StoreError> {
        self.inner.write().await.lineage.remove(mrn);
        Ok(())
    }

    async fn upsert_documentation(&self, doc: Documentation) -> Result<(), StoreError> {
        let mrn = ingest_domain::Mrn::documentation(&doc.doc_type, &ingest_domain::Mrn::new_from_string(&doc.asset_mrn));
        self.inner.write().await.documentation.insert(mrn.as_str().to_string(), doc);
        Ok(())
    }

    async fn delete_documentation(&self, mrn: &str) -> Result<(), StoreError> {
        self.inner.write().await.documentation.remove(mrn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn asset(mrn: &str, name: &str) -> Asset {
        Asset {
            mrn: Some(mrn.to_string()),
            name: name.to_string(),
            r#type: "table".to_string(),
            providers: vec!["demo".to_string()],
            description: None,
            metadata: BTreeMap::new(),
            schema: None,
            tags: vec![],
            sources: vec![],
            external_links: vec![],
        }
    }

    #[tokio::test]
    async fn create_then_delete_is_idempotent() {
        let catalog = InMemoryCatalog::new();
        catalog.create_asset(asset("mrn://table/demo/a", "a")).await.unwrap();
        assert_eq!(catalog.asset_count().await, 1);
        catalog.delete_by_mrn("mrn://table/demo/a").await.unwrap();
        catalog.delete_by_mrn("mrn://table/demo/a").await.unwrap();
        assert_eq!(catalog.asset_count().await, 0);
    }

    #[tokio::test]
    async fn update_replaces_existing() {
        let catalog = InMemoryCatalog::new();
        catalog.create_asset(asset("mrn://table/demo/a", "a")).await.unwrap();
        catalog.update_asset("mrn://table/demo/a", asset("mrn://table/demo/a", "renamed")).await.unwrap();
        let got = catalog.get_asset("mrn://table/demo/a").await.unwrap().unwrap();
        assert_eq!(got.name, "renamed");
    }
}
