use std::collections::HashMap;

use chrono::Utc;
use ingest_domain::{CheckpointOperation, EntityType, Run, RunEntity, RunEntityStatus, RunId, RunStatus};
use ingest_store::{CatalogSink, RunStore};
use tracing::warn;

use crate::error::SchedulerError;

/// Tear down every entity a pipeline has ever produced, across all sources it
/// has ever run under. Enumerates each source's last-run checkpoints, unions
/// them, deletes every non-`deleted` entity from the catalog, records a
/// synthetic `destroy` Run for auditing, and finally wipes the pipeline's
/// checkpoints so the next discovery starts from scratch.
pub async fn destroy_pipeline(
    run_store: &dyn RunStore,
    catalog: &dyn CatalogSink,
    pipeline_name: &str,
) -> Result<Run, SchedulerError> {
    let sources = run_store.list_sources_for_pipeline(pipeline_name).await?;

    let destroy_run = Run {
        id: RunId::new(),
        pipeline_name: pipeline_name.to_string(),
        source_name: "destroy".to_string(),
        status: RunStatus::Running,
        started_at: Utc::now(),
        completed_at: None,
        error_message: None,
        config: HashMap::new(),
        summary: None,
        created_by: None,
    };
    let destroy_run = run_store.create_run(destroy_run).await?;

    for source_name in &sources {
        let checkpoints = run_store.get_last_run_checkpoints(pipeline_name, source_name).await?;
        for ((entity_type, mrn), checkpoint) in checkpoints {
            if checkpoint.operation == CheckpointOperation::Deleted {
                continue;
            }
            let delete_result = match entity_type {
                EntityType::Asset => catalog.delete_by_mrn(&mrn).await,
                EntityType::Lineage => catalog.delete_lineage(&mrn).await,
                EntityType::Documentation => catalog.delete_documentation(&mrn).await,
            };
            if let Err(e) = delete_result {
                warn!(pipeline = %pipeline_name, %mrn, error = %e, "destroy: catalog delete failed");
            }
            run_store
                .add_run_entity(RunEntity {
                    run_id: destroy_run.id,
                    entity_type,
                    entity_mrn: mrn,
                    entity_name: None,
                    status: RunEntityStatus::Deleted,
                    error_message: None,
                    created_at: Utc::now(),
                })
                .await?;
        }
    }

    run_store.clear_pipeline_checkpoints(pipeline_name).await?;

    let mut completed = destroy_run.clone();
    completed.status = RunStatus::Completed;
    completed.completed_at = Some(Utc::now());
    let completed = run_store.update_run(completed).await?;
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_domain::{Asset, Mrn, RunCheckpoint};
    use ingest_store::{InMemoryCatalog, InMemoryStore};
    use std::collections::BTreeMap;

    fn asset(mrn: &str) -> Asset {
        Asset {
            mrn: Some(mrn.to_string()),
            name: "a".to_string(),
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
    async fn destroy_removes_all_entities_and_clears_checkpoints() {
        let run_store = InMemoryStore::new();
        let catalog = InMemoryCatalog::new();

        let run = Run {
            id: RunId::new(),
            pipeline_name: "p".to_string(),
            source_name: "demo".to_string(),
            status: RunStatus::Completed,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            error_message: None,
            config: HashMap::new(),
            summary: None,
            created_by: None,
        };
        RunStore::create_run(&run_store, run.clone()).await.unwrap();

        let a = asset("mrn://table/demo/a");
        catalog.create_asset(a.clone()).await.unwrap();
        run_store
            .add_checkpoint(RunCheckpoint {
                run_id: run.id,
                entity_type: EntityType::Asset,
                entity_mrn: "mrn://table/demo/a".to_string(),
                operation: CheckpointOperation::Created,
                source_fields: vec![a.content_hash()],
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let lineage_mrn = Mrn::lineage("contains", &Mrn::new_from_string("mrn://table/demo/a"), &Mrn::new_from_string("mrn://table/demo/b"));
        run_store
            .add_checkpoint(RunCheckpoint {
                run_id: run.id,
                entity_type: EntityType::Lineage,
                entity_mrn: lineage_mrn.as_str().to_string(),
                operation: CheckpointOperation::Created,
                source_fields: vec![],
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let destroy_run = destroy_pipeline(&run_store, &catalog, "p").await.unwrap();
        assert_eq!(destroy_run.source_name, "destroy");
        assert_eq!(destroy_run.status, RunStatus::Completed);

        let entities = run_store.list_run_entities(destroy_run.id).await.unwrap();
        assert_eq!(entities.len(), 2);
        assert!(entities.iter().all(|e| e.status == RunEntityStatus::Deleted));
        assert!(catalog.get_asset("mrn://table/demo/a").await.unwrap().is_none());

        let remaining = run_store.get_last_run_checkpoints("p", "demo").await.unwrap();
        assert!(remaining.is_empty());
    }
}
