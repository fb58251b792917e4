use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use ingest_domain::{JobRunCounters, JobRunId, JobRunStatus, Run, RunId, RunStatus, RunSummary};
use ingest_plugin::PluginRegistry;
use ingest_secrets::Encryptor;
use ingest_store::{JobRunCompletion, RunStore, ScheduleStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::broadcaster::{EventBroadcaster, JobRunEvent};
use crate::diff::apply_diff;
use crate::error::SchedulerError;

/// Everything a worker needs to execute one [`ingest_domain::JobRun`] end to
/// end. Constructed once by the [`crate::Scheduler`] and cloned per job —
/// every field is an `Arc` or otherwise cheap to clone.
#[derive(Clone)]
pub struct WorkerContext {
    pub schedule_store: Arc<dyn ScheduleStore>,
    pub run_store: Arc<dyn RunStore>,
    pub catalog: Arc<dyn ingest_store::CatalogSink>,
    pub registry: Arc<PluginRegistry>,
    pub encryptor: Option<Arc<Encryptor>>,
    pub broadcaster: Arc<dyn EventBroadcaster>,
    pub worker_id: String,
}

/// Execute one claimed [`JobRun`](ingest_domain::JobRun) to completion.
///
/// Every terminal exit — success, plugin failure, or missing plugin — goes
/// through [`ScheduleStore::complete_job_run`] exactly once; this function
/// never leaves a job in `running` on return. A plugin panic is the one
/// failure mode this function cannot itself catch — the dispatcher wraps the
/// call in `tokio::spawn` and observes that separately.
#[instrument(skip(ctx, cancel), fields(job_run_id = %job_run_id))]
pub async fn run_job(ctx: WorkerContext, job_run_id: JobRunId, cancel: CancellationToken) -> Result<(), SchedulerError> {
    let start = Instant::now();

    if let Err(e) = ctx.schedule_store.start_job_run(job_run_id).await {
        if matches!(e, ingest_store::StoreError::JobRunNotStartable(_)) {
            info!(%job_run_id, "job run was cancelled before the worker could start it; aborting without completing");
            return Ok(());
        }
        return Err(e.into());
    }
    ctx.broadcaster.publish(JobRunEvent::Started { job_run_id });

    let job_run = ctx.schedule_store.get_job_run(job_run_id).await?;

    let Some(schedule_id) = job_run.schedule_id else {
        return fail_job(&ctx, job_run_id, None, "ad-hoc job runs require a schedule_id".to_string()).await;
    };

    let schedule = match ctx.schedule_store.get_schedule(schedule_id).await {
        Ok(s) => s,
        Err(e) => return fail_job(&ctx, job_run_id, None, format!("loading schedule: {e}")).await,
    };

    let raw_config = match decrypt_config(&ctx, &schedule) {
        Ok(c) => c,
        Err(e) => return fail_job(&ctx, job_run_id, None, format!("decrypting schedule config: {e}")).await,
    };

    let source = match ctx.registry.get_source(&schedule.plugin_id).await {
        Ok(s) => s,
        Err(e) => return fail_job(&ctx, job_run_id, None, format!("plugin lookup: {e}")).await,
    };

    let typed = match source.validate(&raw_config) {
        Ok(t) => t,
        Err(e) => return fail_job(&ctx, job_run_id, None, format!("config invalid: {e}")).await,
    };

    let pipeline_name = schedule.name.clone();
    let source_name = schedule.plugin_id.clone();

    let run = Run {
        id: RunId::new(),
        pipeline_name: pipeline_name.clone(),
        source_name: source_name.clone(),
        status: RunStatus::Running,
        started_at: Utc::now(),
        completed_at: None,
        error_message: None,
        config: ingest_config::mask_sensitive_fields(
            &serde_json::to_value(&schedule.config).unwrap_or_default(),
            &source.meta().config_spec,
        )
        .as_object()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .collect(),
        summary: None,
        created_by: schedule.created_by.clone(),
    };
    let run = ctx.run_store.create_run(run).await?;
    ctx.schedule_store.set_job_run_plugin_run_id(job_run_id, run.id).await?;

    let last_checkpoints = ctx.run_store.get_last_run_checkpoints(&pipeline_name, &source_name).await?;

    let discovery = match source.discover(cancel.clone(), &typed).await {
        Ok(d) => d,
        Err(e) => {
            fail_run(&ctx, run.id, format!("discovery failed: {e}")).await;
            return fail_job(&ctx, job_run_id, Some(run.id), format!("discovery failed: {e}")).await;
        }
    };

    let diff_result = apply_diff(
        ctx.run_store.as_ref(),
        ctx.catalog.as_ref(),
        run.id,
        &last_checkpoints,
        &discovery.assets,
        &discovery.lineage,
        &discovery.documentation,
    )
    .await;

    let (counters, mut summary) = match diff_result {
        Ok(v) => v,
        Err(e) => {
            fail_run(&ctx, run.id, format!("applying diff: {e}")).await;
            return fail_job(&ctx, job_run_id, Some(run.id), format!("applying diff: {e}")).await;
        }
    };
    summary.duration_ms = start.elapsed().as_millis() as u64;

    if !discovery.statistics.is_empty() || !discovery.run_history.is_empty() {
        info!(
            statistics = discovery.statistics.len(),
            run_history = discovery.run_history.len(),
            "discovery produced statistics/run-history entries (audit-only; not persisted by the core)"
        );
    }

    let mut completed_run = run.clone();
    completed_run.status = RunStatus::Completed;
    completed_run.completed_at = Some(Utc::now());
    completed_run.summary = Some(summary);
    ctx.run_store.update_run(completed_run).await?;

    if let Err(e) = ctx
        .schedule_store
        .complete_job_run(
            job_run_id,
            JobRunCompletion { status: JobRunStatus::Succeeded, error_message: None, counters },
        )
        .await
    {
        if matches!(e, ingest_store::StoreError::JobRunNotCompletable(_)) {
            info!(%job_run_id, "job run was cancelled while the worker was in flight; discarding its result");
            return Ok(());
        }
        return Err(e.into());
    }
    ctx.broadcaster.publish(JobRunEvent::Completed { job_run_id, status: JobRunStatus::Succeeded });

    info!(
        pipeline = %pipeline_name,
        created = counters.assets_created,
        updated = counters.assets_updated,
        deleted = counters.assets_deleted,
        "job run succeeded"
    );
    Ok(())
}

fn decrypt_config(ctx: &WorkerContext, schedule: &ingest_domain::Schedule) -> Result<serde_json::Value, SchedulerError> {
    let raw = serde_json::to_value(&schedule.config).unwrap_or_default();
    let Some(encryptor) = &ctx.encryptor else {
        return Ok(raw);
    };
    // Every string leaf may have been encrypted; decrypt_map is a no-op on
    // plaintext, so it's safe to pass every top-level key as a candidate path
    // rather than re-deriving the plugin's sensitive-field list here (the
    // worker doesn't have the ConfigSpec until after plugin lookup).
    let fields: Vec<String> = collect_leaf_paths(&raw, "");
    Ok(ingest_secrets::decrypt_map(encryptor, &raw, &fields)?)
}

fn collect_leaf_paths(value: &serde_json::Value, prefix: &str) -> Vec<String> {
    match value {
        serde_json::Value::Object(map) => {
            let mut out = Vec::new();
            for (k, v) in map {
                let path = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
                out.extend(collect_leaf_paths(v, &path));
            }
            out
        }
        serde_json::Value::String(_) | serde_json::Value::Array(_) => vec![prefix.to_string()],
        _ => vec![],
    }
}

async fn fail_run(ctx: &WorkerContext, run_id: RunId, message: String) {
    if let Ok(mut run) = ctx.run_store.get_run(run_id).await {
        run.status = RunStatus::Failed;
        run.completed_at = Some(Utc::now());
        run.error_message = Some(message);
        if let Err(e) = ctx.run_store.update_run(run).await {
            warn!(%run_id, error = %e, "failed to mark run failed");
        }
    }
}

async fn fail_job(
    ctx: &WorkerContext,
    job_run_id: JobRunId,
    run_id: Option<RunId>,
    message: String,
) -> Result<(), SchedulerError> {
    error!(%job_run_id, ?run_id, error = %message, "job run failed");
    if let Err(e) = ctx
        .schedule_store
        .complete_job_run(
            job_run_id,
            JobRunCompletion {
                status: JobRunStatus::Failed,
                error_message: Some(message),
                counters: JobRunCounters::default(),
            },
        )
        .await
    {
        if matches!(e, ingest_store::StoreError::JobRunNotCompletable(_)) {
            info!(%job_run_id, "job run was cancelled before its failure could be recorded");
            return Ok(());
        }
        return Err(e.into());
    }
    ctx.broadcaster.publish(JobRunEvent::Completed { job_run_id, status: JobRunStatus::Failed });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::NoopBroadcaster;
    use ingest_plugin::DemoSource;
    use ingest_store::{InMemoryCatalog, InMemoryStore, NewSchedule};
    use std::collections::HashMap;

    fn context(registry: Arc<PluginRegistry>, store: Arc<InMemoryStore>) -> WorkerContext {
        WorkerContext {
            schedule_store: store.clone(),
            run_store: store,
            catalog: Arc::new(InMemoryCatalog::new()),
            registry,
            encryptor: None,
            broadcaster: Arc::new(NoopBroadcaster),
            worker_id: "w1".to_string(),
        }
    }

    #[tokio::test]
    async fn successful_discovery_marks_job_succeeded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hi").unwrap();

        let registry = Arc::new(PluginRegistry::new());
        registry.register(Arc::new(DemoSource::new())).await.unwrap();
        let store = Arc::new(InMemoryStore::new());

        let schedule = store
            .create_schedule(NewSchedule {
                name: "fs-pipeline".to_string(),
                plugin_id: "demo".to_string(),
                config: HashMap::from([(
                    "root_path".to_string(),
                    serde_json::json!(dir.path().to_string_lossy()),
                )]),
                cron_expression: String::new(),
                enabled: true,
                created_by: None,
            })
            .await
            .unwrap();

        let job_run = store.create_job_run(Some(schedule.id), None).await.unwrap();
        let ctx = context(registry, store.clone());
        run_job(ctx, job_run.id, CancellationToken::new()).await.unwrap();

        let completed = store.get_job_run(job_run.id).await.unwrap();
        assert_eq!(completed.status, JobRunStatus::Succeeded);
        assert!(completed.counters.assets_created > 0);
    }

    #[tokio::test]
    async fn cancelled_before_start_is_left_cancelled() {
        let registry = Arc::new(PluginRegistry::new());
        registry.register(Arc::new(DemoSource::new())).await.unwrap();
        let store = Arc::new(InMemoryStore::new());
        let schedule = store
            .create_schedule(NewSchedule {
                name: "cancel-me".to_string(),
                plugin_id: "demo".to_string(),
                config: HashMap::new(),
                cron_expression: String::new(),
                enabled: true,
                created_by: None,
            })
            .await
            .unwrap();
        let job_run = store.create_job_run(Some(schedule.id), None).await.unwrap();
        store.cancel_job_run(job_run.id).await.unwrap();

        let ctx = context(registry, store.clone());
        run_job(ctx, job_run.id, CancellationToken::new()).await.unwrap();

        let completed = store.get_job_run(job_run.id).await.unwrap();
        assert_eq!(completed.status, JobRunStatus::Cancelled);
    }

    #[tokio::test]
    async fn missing_plugin_fails_job() {
        let registry = Arc::new(PluginRegistry::new());
        let store = Arc::new(InMemoryStore::new());
        let schedule = store
            .create_schedule(NewSchedule {
                name: "no-plugin".to_string(),
                plugin_id: "does-not-exist".to_string(),
                config: HashMap::new(),
                cron_expression: String::new(),
                enabled: true,
                created_by: None,
            })
            .await
            .unwrap();
        let job_run = store.create_job_run(Some(schedule.id), None).await.unwrap();
        let ctx = context(registry, store.clone());
        run_job(ctx, job_run.id, CancellationToken::new()).await.unwrap();

        let completed = store.get_job_run(job_run.id).await.unwrap();
        assert_eq!(completed.status, JobRunStatus::Failed);
        assert!(completed.error_message.unwrap().contains("plugin lookup"));
    }

    #[tokio::test]
    async fn invalid_config_fails_job() {
        let registry = Arc::new(PluginRegistry::new());
        registry.register(Arc::new(DemoSource::new())).await.unwrap();
        let store = Arc::new(InMemoryStore::new());
        let schedule = store
            .create_schedule(NewSchedule {
                name: "bad-config".to_string(),
                plugin_id: "demo".to_string(),
                config: HashMap::new(),
                cron_expression: String::new(),
                enabled: true,
                created_by: None,
            })
            .await
            .unwrap();
        let job_run = store.create_job_run(Some(schedule.id), None).await.unwrap();
        let ctx = context(registry, store.clone());
        run_job(ctx, job_run.id, CancellationToken::new()).await.unwrap();

        let completed = store.get_job_run(job_run.id).await.unwrap();
        assert_eq!(completed.status, JobRunStatus::Failed);
        assert!(completed.error_message.unwrap().contains("config invalid"));
    }
}
