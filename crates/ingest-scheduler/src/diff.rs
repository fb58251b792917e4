use std::collections::HashSet;

use chrono::Utc;
use ingest_domain::{
    Asset, CheckpointOperation, Documentation, EntityType, JobRunCounters, LineageEdge, Mrn, RunCheckpoint,
    RunEntity, RunEntityStatus, RunId, RunSummary,
};
use ingest_store::{CatalogSink, CheckpointMap, RunStore};
use tracing::warn;

use crate::error::SchedulerError;

/// The differential create/update/unchanged/delete classification applied to
/// one discovery result, run against the checkpoints left by the pipeline's
/// previous completed run. See the design notes on the diff algorithm: it is
/// intentionally self-healing — a half-applied catalog write just looks like
/// `updated` again on the next run because the stored hash won't match.
pub async fn apply_diff(
    run_store: &dyn RunStore,
    catalog: &dyn CatalogSink,
    run_id: RunId,
    last_checkpoints: &CheckpointMap,
    assets: &[Asset],
    lineage: &[LineageEdge],
    documentation: &[Documentation],
) -> Result<(JobRunCounters, RunSummary), SchedulerError> {
    let mut counters = JobRunCounters::default();
    let mut summary = RunSummary::default();

    let mut current_asset_mrns = HashSet::new();
    for asset in assets {
        let mrn = asset.canonical_mrn();
        current_asset_mrns.insert(mrn.as_str().to_string());
        let hash = asset.content_hash();
        let key = (EntityType::Asset, mrn.as_str().to_string());
        let prior = last_checkpoints.get(&key);

        let status = classify_asset(prior, &hash);
        match status {
            RunEntityStatus::Created => {
                catalog.create_asset(asset.clone()).await?;
                counters.assets_created += 1;
                summary.assets_created += 1;
            }
            RunEntityStatus::Updated => {
                catalog.update_asset(mrn.as_str(), asset.clone()).await?;
                counters.assets_updated += 1;
                summary.assets_updated += 1;
            }
            RunEntityStatus::Unchanged => {
                summary.assets_unchanged += 1;
            }
            RunEntityStatus::Deleted | RunEntityStatus::Failed => unreachable!("classify_asset never returns this"),
        }

        record_entity(run_store, run_id, EntityType::Asset, mrn.as_str(), Some(asset.name.clone()), status).await?;
        upsert_checkpoint(run_store, run_id, EntityType::Asset, mrn.as_str(), checkpoint_op(status), vec![hash])
            .await?;
    }

    let mut current_lineage_mrns = HashSet::new();
    for edge in lineage {
        let mrn = Mrn::lineage(&edge.edge_type, &Mrn::new_from_string(&edge.source_mrn), &Mrn::new_from_string(&edge.target_mrn));
        current_lineage_mrns.insert(mrn.as_str().to_string());
        let key = (EntityType::Lineage, mrn.as_str().to_string());
        let status = classify_no_hash(last_checkpoints.get(&key));
        catalog.upsert_lineage(edge.clone()).await?;
        match status {
            RunEntityStatus::Created => {
                counters.lineage_created += 1;
                summary.lineage_created += 1;
            }
            RunEntityStatus::Updated => summary.lineage_updated += 1,
            _ => unreachable!("classify_no_hash never returns this"),
        }
        record_entity(run_store, run_id, EntityType::Lineage, mrn.as_str(), None, status).await?;
        upsert_checkpoint(run_store, run_id, EntityType::Lineage, mrn.as_str(), checkpoint_op(status), vec![]).await?;
    }

    let mut current_doc_mrns = HashSet::new();
    for doc in documentation {
        let mrn = Mrn::documentation(&doc.doc_type, &Mrn::new_from_string(&doc.asset_mrn));
        current_doc_mrns.insert(mrn.as_str().to_string());
        let key = (EntityType::Documentation, mrn.as_str().to_string());
        let status = classify_no_hash(last_checkpoints.get(&key));
        catalog.upsert_documentation(doc.clone()).await?;
        match status {
            RunEntityStatus::Created => {
                counters.documentation_added += 1;
                summary.documentation_created += 1;
            }
            RunEntityStatus::Updated => summary.documentation_updated += 1,
            _ => unreachable!("classify_no_hash never returns this"),
        }
        record_entity(run_store, run_id, EntityType::Documentation, mrn.as_str(), Some(doc.title.clone()), status).await?;
        upsert_checkpoint(run_store, run_id, EntityType::Documentation, mrn.as_str(), checkpoint_op(status), vec![])
            .await?;
    }

    delete_stale(
        run_store,
        catalog,
        run_id,
        last_checkpoints,
        EntityType::Asset,
        &current_asset_mrns,
        &mut counters.assets_deleted,
        &mut summary.assets_deleted,
    )
    .await?;
    delete_stale_lineage(run_store, catalog, run_id, last_checkpoints, &current_lineage_mrns).await?;
    delete_stale_documentation(run_store, catalog, run_id, last_checkpoints, &current_doc_mrns).await?;

    Ok((counters, summary))
}

fn classify_asset(prior: Option<&RunCheckpoint>, current_hash: &str) -> RunEntityStatus {
    match prior {
        None => RunEntityStatus::Created,
        Some(cp) if cp.operation == CheckpointOperation::Deleted => RunEntityStatus::Created,
        Some(cp) if cp.content_hash() == Some(current_hash) => RunEntityStatus::Unchanged,
        Some(_) => RunEntityStatus::Updated,
    }
}

fn classify_no_hash(prior: Option<&RunCheckpoint>) -> RunEntityStatus {
    match prior {
        None => RunEntityStatus::Created,
        Some(cp) if cp.operation == CheckpointOperation::Deleted => RunEntityStatus::Created,
        Some(_) => RunEntityStatus::Updated,
    }
}

fn checkpoint_op(status: RunEntityStatus) -> CheckpointOperation {
    match status {
        RunEntityStatus::Created => CheckpointOperation::Created,
        RunEntityStatus::Updated => CheckpointOperation::Updated,
        RunEntityStatus::Unchanged => CheckpointOperation::Unchanged,
        RunEntityStatus::Deleted => CheckpointOperation::Deleted,
        RunEntityStatus::Failed => CheckpointOperation::Updated,
    }
}

async fn record_entity(
    run_store: &dyn RunStore,
    run_id: RunId,
    entity_type: EntityType,
    mrn: &str,
    entity_name: Option<String>,
    status: RunEntityStatus,
) -> Result<(), SchedulerError> {
    run_store
        .add_run_entity(RunEntity {
            run_id,
            entity_type,
            entity_mrn: mrn.to_string(),
            entity_name,
            status,
            error_message: None,
            created_at: Utc::now(),
        })
        .await?;
    Ok(())
}

async fn upsert_checkpoint(
    run_store: &dyn RunStore,
    run_id: RunId,
    entity_type: EntityType,
    mrn: &str,
    operation: CheckpointOperation,
    source_fields: Vec<String>,
) -> Result<(), SchedulerError> {
    run_store
        .add_checkpoint(RunCheckpoint {
            run_id,
            entity_type,
            entity_mrn: mrn.to_string(),
            operation,
            source_fields,
            created_at: Utc::now(),
        })
        .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn delete_stale(
    run_store: &dyn RunStore,
    catalog: &dyn CatalogSink,
    run_id: RunId,
    last_checkpoints: &CheckpointMap,
    entity_type: EntityType,
    current_mrns: &HashSet<String>,
    job_counter: &mut u64,
    summary_counter: &mut u64,
) -> Result<(), SchedulerError> {
    let stale: Vec<String> = last_checkpoints
        .iter()
        .filter(|((t, _), cp)| *t == entity_type && cp.operation != CheckpointOperation::Deleted)
        .filter(|((_, mrn), _)| !current_mrns.contains(mrn))
        .map(|((_, mrn), _)| mrn.clone())
        .collect();

    for mrn in stale {
        if let Err(e) = catalog.delete_by_mrn(&mrn).await {
            warn!(%mrn, error = %e, "stale asset delete failed, checkpoint still marked deleted");
        }
        record_entity(run_store, run_id, entity_type, &mrn, None, RunEntityStatus::Deleted).await?;
        upsert_checkpoint(run_store, run_id, entity_type, &mrn, CheckpointOperation::Deleted, vec![]).await?;
        *job_counter += 1;
        *summary_counter += 1;
    }
    Ok(())
}

async fn delete_stale_lineage(
    run_store: &dyn RunStore,
    catalog: &dyn CatalogSink,
    run_id: RunId,
    last_checkpoints: &CheckpointMap,
    current_mrns: &HashSet<String>,
) -> Result<(), SchedulerError> {
    let stale: Vec<String> = last_checkpoints
        .iter()
        .filter(|((t, _), cp)| *t == EntityType::Lineage && cp.operation != CheckpointOperation::Deleted)
        .filter(|((_, mrn), _)| !current_mrns.contains(mrn))
        .map(|((_, mrn), _)| mrn.clone())
        .collect();
    for mrn in stale {
        if let Err(e) = catalog.delete_lineage(&mrn).await {
            warn!(%mrn, error = %e, "stale lineage delete failed, checkpoint still marked deleted");
        }
        record_entity(run_store, run_id, EntityType::Lineage, &mrn, None, RunEntityStatus::Deleted).await?;
        upsert_checkpoint(run_store, run_id, EntityType::Lineage, &mrn, CheckpointOperation::Deleted, vec![]).await?;
    }
    Ok(())
}

async fn delete_stale_documentation(
    run_store: &dyn RunStore,
    catalog: &dyn CatalogSink,
    run_id: RunId,
    last_checkpoints: &CheckpointMap,
    current_mrns: &HashSet<String>,
) -> Result<(), SchedulerError> {
    let stale: Vec<String> = last_checkpoints
        .iter()
        .filter(|((t, _), cp)| *t == EntityType::Documentation && cp.operation != CheckpointOperation::Deleted)
        .filter(|((_, mrn), _)| !current_mrns.contains(mrn))
        .map(|((_, mrn), _)| mrn.clone())
        .collect();
    for mrn in stale {
        if let Err(e) = catalog.delete_documentation(&mrn).await {
            warn!(%mrn, error = %e, "stale documentation delete failed, checkpoint still marked deleted");
        }
        record_entity(run_store, run_id, EntityType::Documentation, &mrn, None, RunEntityStatus::Deleted).await?;
        upsert_checkpoint(run_store, run_id, EntityType::Documentation, &mrn, CheckpointOperation::Deleted, vec![])
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_store::InMemoryStore;
    use std::collections::BTreeMap;
    use std::collections::HashMap;

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
    async fn classifies_created_unchanged_and_deleted() {
        let run_store = InMemoryStore::new();
        let catalog = ingest_store::InMemoryCatalog::new();
        let run_id = RunId::new();
        RunStore::create_run(
            &run_store,
            ingest_domain::Run {
                id: run_id,
                pipeline_name: "p".into(),
                source_name: "demo".into(),
                status: ingest_domain::RunStatus::Running,
                started_at: Utc::now(),
                completed_at: None,
                error_message: None,
                config: HashMap::new(),
                summary: None,
                created_by: None,
            },
        )
        .await
        .unwrap();

        let a = asset("mrn://table/demo/a", "a");
        let b = asset("mrn://table/demo/b", "b");
        let mut last_checkpoints = CheckpointMap::new();
        last_checkpoints.insert(
            (EntityType::Asset, "mrn://table/demo/a".to_string()),
            RunCheckpoint {
                run_id,
                entity_type: EntityType::Asset,
                entity_mrn: "mrn://table/demo/a".to_string(),
                operation: CheckpointOperation::Created,
                source_fields: vec![a.content_hash()],
                created_at: Utc::now(),
            },
        );
        last_checkpoints.insert(
            (EntityType::Asset, "mrn://table/demo/b".to_string()),
            RunCheckpoint {
                run_id,
                entity_type: EntityType::Asset,
                entity_mrn: "mrn://table/demo/b".to_string(),
                operation: CheckpointOperation::Created,
                source_fields: vec!["stale-hash".to_string()],
                created_at: Utc::now(),
            },
        );

        let c = asset("mrn://table/demo/c", "c");
        let (counters, summary) =
            apply_diff(&run_store, &catalog, run_id, &last_checkpoints, &[a, c], &[], &[]).await.unwrap();

        assert_eq!(counters.assets_created, 1);
        assert_eq!(summary.assets_unchanged, 1);
        assert_eq!(counters.assets_deleted, 1);
        assert_eq!(catalog.get_asset("mrn://table/demo/b").await.unwrap(), None);
        assert!(catalog.get_asset("mrn://table/demo/c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn hash_change_is_updated_not_unchanged() {
        let run_store = InMemoryStore::new();
        let catalog = ingest_store::InMemoryCatalog::new();
        let run_id = RunId::new();
        RunStore::create_run(
            &run_store,
            ingest_domain::Run {
                id: run_id,
                pipeline_name: "p".into(),
                source_name: "demo".into(),
                status: ingest_domain::RunStatus::Running,
                started_at: Utc::now(),
                completed_at: None,
                error_message: None,
                config: HashMap::new(),
                summary: None,
                created_by: None,
            },
        )
        .await
        .unwrap();

        let original = asset("mrn://table/demo/a", "a");
        let mut changed = original.clone();
        changed.description = Some("now documented".to_string());

        let mut last_checkpoints = CheckpointMap::new();
        last_checkpoints.insert(
            (EntityType::Asset, "mrn://table/demo/a".to_string()),
            RunCheckpoint {
                run_id,
                entity_type: EntityType::Asset,
                entity_mrn: "mrn://table/demo/a".to_string(),
                operation: CheckpointOperation::Created,
                source_fields: vec![original.content_hash()],
                created_at: Utc::now(),
            },
        );

        let (counters, summary) =
            apply_diff(&run_store, &catalog, run_id, &last_checkpoints, &[changed], &[], &[]).await.unwrap();
        assert_eq!(counters.assets_updated, 1);
        assert_eq!(summary.assets_unchanged, 0);
    }
}
