use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::mrn::Mrn;

/// A discovered data asset (table, topic, queue, DAG, bucket, …).
///
/// `mrn` is optional on the wire: when absent the worker synthesizes one from
/// `(type, providers[0], name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub mrn: Option<String>,
    pub name: String,
    pub r#type: String,
    pub providers: Vec<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub schema: Option<Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub external_links: Vec<ExternalLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalLink {
    pub label: String,
    pub url: String,
}

impl Asset {
    /// Resolve the canonical MRN: the asset's own `mrn` if set, else
    /// synthesized from its type/provider/name.
    pub fn canonical_mrn(&self) -> Mrn {
        match &self.mrn {
            Some(m) => Mrn::new_from_string(m),
            None => Mrn::new(
                &self.r#type,
                self.providers.first().map(String::as_str).unwrap_or(""),
                &self.name,
            ),
        }
    }

    /// SHA-256 of the canonical JSON of the tuple the diff engine compares
    /// across runs: `(name, type, providers, description, metadata, schema,
    /// tags, sources, external_links)`. Any field outside this tuple (e.g. a
    /// future-only display field) never flips `unchanged` to `updated`.
    pub fn content_hash(&self) -> String {
        let normalized = serde_json::json!({
            "name": self.name,
            "type": self.r#type,
            "providers": self.providers,
            "description": self.description,
            "metadata": sorted(&self.metadata),
            "schema": self.schema,
            "tags": self.tags,
            "sources": self.sources,
            "external_links": self.external_links,
        });
        let bytes = serde_json::to_vec(&normalized).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }
}

/// Re-serialize a map with sorted keys so field insertion order never affects
/// the content hash.
fn sorted(m: &BTreeMap<String, Value>) -> Value {
    // BTreeMap already iterates in key order; serde_json::Map preserves
    // insertion order, so we rebuild it explicitly to guarantee sorting.
    let map: serde_json::Map<String, Value> = m.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    Value::Object(map)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEdge {
    pub edge_type: String,
    pub source_mrn: String,
    pub target_mrn: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Documentation {
    pub doc_type: String,
    pub asset_mrn: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistic {
    pub asset_mrn: String,
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRunHistory {
    pub asset_mrn: String,
    pub run_id: String,
    pub detail: Value,
}

/// The bundle of entities produced by one `Source::discover` invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub assets: Vec<Asset>,
    pub lineage: Vec<LineageEdge>,
    pub documentation: Vec<Documentation>,
    pub statistics: Vec<Statistic>,
    pub run_history: Vec<AssetRunHistory>,
}
