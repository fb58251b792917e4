use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ingest_config::validate_config;
use ingest_domain::{Asset, ConfigField, ConfigSpec, Documentation, DiscoveryResult, Statistic};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::PluginError;
use crate::source::{PluginMeta, Source};

/// A demonstration source that discovers assets from a directory tree on the
/// local filesystem. Not a production data-source integration — it exists so
/// the worker, scheduler, and diff engine have a real (if simple) plugin to
/// exercise end to end, and as a template for plugin authors.
pub struct DemoSource;

impl DemoSource {
    pub fn new() -> Self {
        Self
    }

    fn spec() -> ConfigSpec {
        ConfigSpec::new(vec![
            ConfigField::string("root_path")
                .required()
                .label("Root path")
                .description("Filesystem directory to scan for assets."),
            ConfigField::bool("include_hidden")
                .default(json!(false))
                .label("Include hidden files")
                .description("Include dotfiles and dot-directories in the scan."),
        ])
    }
}

impl Default for DemoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, serde::Deserialize)]
struct TypedConfig {
    root_path: String,
    #[serde(default)]
    include_hidden: bool,
}

#[async_trait]
impl Source for DemoSource {
    fn meta(&self) -> PluginMeta {
        PluginMeta {
            id: "demo".to_string(),
            display_name: "Demo filesystem source".to_string(),
            description: "Discovers files under a local directory as assets.".to_string(),
            config_spec: Self::spec(),
        }
    }

    fn validate(&self, raw: &Value) -> Result<Value, PluginError> {
        validate_config(raw, &Self::spec()).map_err(PluginError::ConfigInvalid)
    }

    async fn discover(&self, ctx: CancellationToken, typed: &Value) -> Result<DiscoveryResult, PluginError> {
        let cfg: TypedConfig = serde_json::from_value(typed.clone())
            .map_err(|e| PluginError::DiscoveryFailed(format!("invalid typed config: {e}")))?;
        let root = PathBuf::from(cfg.root_path);

        tokio::task::spawn_blocking(move || scan(&root, cfg.include_hidden, &ctx))
            .await
            .map_err(|e| PluginError::DiscoveryFailed(format!("scan task panicked: {e}")))?
    }
}

fn scan(root: &Path, include_hidden: bool, ctx: &CancellationToken) -> Result<DiscoveryResult, PluginError> {
    if !root.is_dir() {
        return Err(PluginError::DiscoveryFailed(format!("{} is not a directory", root.display())));
    }

    let mut assets = Vec::new();
    let mut lineage = Vec::new();
    let mut documentation = Vec::new();
    walk(root, root, include_hidden, ctx, &mut assets, &mut lineage, &mut documentation)?;

    let statistics = vec![Statistic {
        asset_mrn: root_mrn(root).as_str().to_string(),
        name: "file_count".to_string(),
        value: json!(assets.iter().filter(|a| a.r#type == "file").count()),
    }];

    Ok(DiscoveryResult { assets, lineage, documentation, statistics, run_history: vec![] })
}

fn root_mrn(root: &Path) -> ingest_domain::Mrn {
    ingest_domain::Mrn::new("directory", "filesystem", &rel(root, root))
}

fn rel(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
        .trim_start_matches('/')
        .to_string()
        .if_empty(".")
}

trait IfEmpty {
    fn if_empty(self, default: &str) -> String;
}

impl IfEmpty for String {
    fn if_empty(self, default: &str) -> String {
        if self.is_empty() {
            default.to_string()
        } else {
            self
        }
    }
}

fn is_hidden(entry_name: &str) -> bool {
    entry_name.starts_with('.')
}

#[allow(clippy::too_many_arguments)]
fn walk(
    root: &Path,
    dir: &Path,
    include_hidden: bool,
    ctx: &CancellationToken,
    assets: &mut Vec<Asset>,
    lineage: &mut Vec<ingest_domain::LineageEdge>,
    documentation: &mut Vec<Documentation>,
) -> Result<(), PluginError> {
    if ctx.is_cancelled() {
        return Err(PluginError::Cancelled);
    }

    let dir_mrn = ingest_domain::Mrn::new("directory", "filesystem", &rel(root, dir));
    let dir_name = rel(root, dir);
    assets.push(Asset {
        mrn: Some(dir_mrn.as_str().to_string()),
        name: dir_name,
        r#type: "directory".to_string(),
        providers: vec!["filesystem".to_string()],
        description: None,
        metadata: BTreeMap::new(),
        schema: None,
        tags: vec![],
        sources: vec![],
        external_links: vec![],
    });

    let entries = std::fs::read_dir(dir)
        .map_err(|e| PluginError::DiscoveryFailed(format!("reading {}: {e}", dir.display())))?;

    for entry in entries {
        if ctx.is_cancelled() {
            return Err(PluginError::Cancelled);
        }
        let entry = entry.map_err(|e| PluginError::DiscoveryFailed(e.to_string()))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !include_hidden && is_hidden(&name) {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| PluginError::DiscoveryFailed(e.to_string()))?;

        if file_type.is_dir() {
            let child_mrn = ingest_domain::Mrn::new("directory", "filesystem", &rel(root, &path));
            lineage.push(ingest_domain::LineageEdge {
                edge_type: "contains".to_string(),
                source_mrn: dir_mrn.as_str().to_string(),
                target_mrn: child_mrn.as_str().to_string(),
                metadata: BTreeMap::new(),
            });
            walk(root, &path, include_hidden, ctx, assets, lineage, documentation)?;
        } else if file_type.is_file() {
            let metadata = entry.metadata().map_err(|e| PluginError::DiscoveryFailed(e.to_string()))?;
            let rel_path = rel(root, &path);
            let file_mrn = ingest_domain::Mrn::new("file", "filesystem", &rel_path);

            let mut meta = BTreeMap::new();
            meta.insert("size_bytes".to_string(), json!(metadata.len()));
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                meta.insert("extension".to_string(), json!(ext));
            }

            assets.push(Asset {
                mrn: Some(file_mrn.as_str().to_string()),
                name: rel_path.clone(),
                r#type: "file".to_string(),
                providers: vec!["filesystem".to_string()],
                description: None,
                metadata: meta,
                schema: None,
                tags: vec![],
                sources: vec![],
                external_links: vec![],
            });

            lineage.push(ingest_domain::LineageEdge {
                edge_type: "contains".to_string(),
                source_mrn: dir_mrn.as_str().to_string(),
                target_mrn: file_mrn.as_str().to_string(),
                metadata: BTreeMap::new(),
            });

            if name.eq_ignore_ascii_case("readme.md") || name.eq_ignore_ascii_case("readme") {
                if let Ok(body) = std::fs::read_to_string(&path) {
                    documentation.push(Documentation {
                        doc_type: "readme".to_string(),
                        asset_mrn: file_mrn.as_str().to_string(),
                        title: name,
                        body,
                    });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn discovers_files_and_lineage() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("b.txt"), "world").unwrap();
        fs::write(dir.path().join("README.md"), "# Title\nbody").unwrap();

        let source = DemoSource::new();
        let typed = json!({ "root_path": dir.path().to_string_lossy() });
        let result = source.discover(CancellationToken::new(), &typed).await.unwrap();

        let file_assets: Vec<_> = result.assets.iter().filter(|a| a.r#type == "file").collect();
        assert_eq!(file_assets.len(), 3);
        assert!(result.lineage.iter().any(|e| e.edge_type == "contains"));
        assert_eq!(result.documentation.len(), 1);
        assert_eq!(result.documentation[0].title.to_lowercase(), "readme.md");
    }

    #[tokio::test]
    async fn validate_requires_root_path() {
        let source = DemoSource::new();
        let err = source.validate(&json!({})).unwrap_err();
        assert!(matches!(err, PluginError::ConfigInvalid(errs) if errs.iter().any(|e| e.field == "root_path")));
    }

    #[tokio::test]
    async fn nonexistent_root_fails_discovery() {
        let source = DemoSource::new();
        let typed = json!({ "root_path": "/no/such/path/at/all" });
        let err = source.discover(CancellationToken::new(), &typed).await.unwrap_err();
        assert!(matches!(err, PluginError::DiscoveryFailed(_)));
    }
}
