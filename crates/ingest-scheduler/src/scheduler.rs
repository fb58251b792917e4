use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ingest_domain::{JobRunCounters, JobRunId, JobRunStatus};
use ingest_plugin::PluginRegistry;
use ingest_secrets::Encryptor;
use ingest_store::{calculate_next_run, RunStore, ScheduleStore};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broadcaster::{EventBroadcaster, JobRunEvent, NoopBroadcaster};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::worker::{run_job, WorkerContext};

/// Drives the four cooperating loops described in the component design: the
/// schedule loop, the pending-jobs poller, the dispatcher, and the
/// lease-cleanup sweep. One instance per process; [`Scheduler::start`] spawns
/// all four as independent `tokio` tasks and returns a handle that joins them
/// on [`SchedulerHandle::stop`].
pub struct Scheduler {
    schedule_store: Arc<dyn ScheduleStore>,
    run_store: Arc<dyn RunStore>,
    catalog: Arc<dyn ingest_store::CatalogSink>,
    registry: Arc<PluginRegistry>,
    encryptor: Option<Arc<Encryptor>>,
    broadcaster: Arc<dyn EventBroadcaster>,
    config: SchedulerConfig,
    cancel: CancellationToken,
    active_workers: Arc<AtomicUsize>,
}

/// Handle returned by [`Scheduler::start`]. Dropping it does not stop the
/// scheduler — call [`Self::stop`] explicitly for a clean shutdown.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl SchedulerHandle {
    /// Cancel the root token and wait for all four loops — and, by
    /// extension, the dispatcher's in-flight workers — to observe it and
    /// return.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        while let Some(res) = self.tasks.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "scheduler loop task panicked during shutdown");
            }
        }
    }
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        schedule_store: Arc<dyn ScheduleStore>,
        run_store: Arc<dyn RunStore>,
        catalog: Arc<dyn ingest_store::CatalogSink>,
        registry: Arc<PluginRegistry>,
        encryptor: Option<Arc<Encryptor>>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            schedule_store,
            run_store,
            catalog,
            registry,
            encryptor,
            broadcaster: Arc::new(NoopBroadcaster),
            config,
            cancel: CancellationToken::new(),
            active_workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn EventBroadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    /// Run startup crash recovery (un-claim orphaned claims, fail orphaned
    /// runs), then spawn the four loops and return a handle.
    pub async fn start(self) -> Result<SchedulerHandle, SchedulerError> {
        let released = self.schedule_store.release_expired_claims(self.config.lease_expiry).await?;
        if released > 0 {
            info!(count = released, "released stale claims on startup");
        }
        let failed = self.run_store.cleanup_stale_runs(self.config.stale_run_timeout).await?;
        if failed > 0 {
            info!(count = failed, "failed orphaned runs on startup");
        }

        let (tx, rx) = mpsc::channel::<JobRunId>(self.config.job_queue_capacity);
        let mut tasks = JoinSet::new();

        tasks.spawn(schedule_loop(
            self.schedule_store.clone(),
            self.config.clone(),
            self.cancel.clone(),
            tx.clone(),
        ));
        tasks.spawn(poller_loop(self.schedule_store.clone(), self.config.clone(), self.cancel.clone(), tx));
        tasks.spawn(dispatcher_loop(rx, self.worker_context(), self.config.max_workers, self.active_workers.clone(), self.cancel.clone()));
        tasks.spawn(lease_cleanup_loop(self.schedule_store.clone(), self.config.clone(), self.cancel.clone()));

        Ok(SchedulerHandle { cancel: self.cancel.clone(), tasks })
    }

    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            schedule_store: self.schedule_store.clone(),
            run_store: self.run_store.clone(),
            catalog: self.catalog.clone(),
            registry: self.registry.clone(),
            encryptor: self.encryptor.clone(),
            broadcaster: self.broadcaster.clone(),
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
        }
    }
}

/// Every `scheduler_interval`, enqueue a pending JobRun for each due schedule
/// and advance its `next_run_at`.
async fn schedule_loop(store: Arc<dyn ScheduleStore>, config: SchedulerConfig, cancel: CancellationToken, tx: mpsc::Sender<JobRunId>) {
    let mut ticker = tokio::time::interval(config.scheduler_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let due = match store.get_schedules_due_for_run(100).await {
            Ok(d) => d,
            Err(e) => {
                error!(error = %e, "schedule loop: failed to fetch due schedules");
                continue;
            }
        };

        for schedule in due {
            if !config.allow_overlapping_runs {
                match store.has_active_job_run(schedule.id).await {
                    Ok(true) => {
                        debug!(schedule = %schedule.name, "skipping tick: a non-terminal job run already exists");
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!(schedule = %schedule.name, error = %e, "schedule loop: has_active_job_run failed");
                        continue;
                    }
                }
            }

            let next_run_at = match calculate_next_run(&schedule.cron_expression, chrono::Utc::now()) {
                Ok(t) => t,
                Err(e) => {
                    error!(schedule = %schedule.name, error = %e, "schedule loop: invalid cron expression, skipping");
                    continue;
                }
            };

            match store.create_job_run(Some(schedule.id), None).await {
                Ok(job_run) => {
                    let _ = tx.try_send(job_run.id);
                }
                Err(e) => {
                    error!(schedule = %schedule.name, error = %e, "schedule loop: create_job_run failed");
                    continue;
                }
            }

            if let Err(e) = store.update_schedule_next_run(schedule.id, Some(next_run_at)).await {
                error!(schedule = %schedule.name, error = %e, "schedule loop: update_schedule_next_run failed");
            }
        }
    }
}

/// Every 2s (configurable), drain up to `poll_batch_size` pending JobRuns
/// into the in-memory dispatcher queue. A full queue is backpressure, not an
/// error — the run stays `pending` and is retried next tick.
async fn poller_loop(store: Arc<dyn ScheduleStore>, config: SchedulerConfig, cancel: CancellationToken, tx: mpsc::Sender<JobRunId>) {
    let mut ticker = tokio::time::interval(config.poll_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let filter = ingest_store::JobRunFilter {
            schedule_id: None,
            status: Some(JobRunStatus::Pending),
            limit: config.poll_batch_size,
            offset: 0,
        };
        let pending = match store.list_job_runs(filter).await {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "poller: failed to list pending job runs");
                continue;
            }
        };

        for job_run in pending {
            if tx.try_send(job_run.id).is_err() {
                // Queue full: leave it pending, retried next tick.
                break;
            }
        }
    }
}

/// Consume the job queue; for each job, acquire a worker permit and spawn it.
/// Each dispatched task wraps its own `run_job` call in an inner
/// `tokio::spawn` so a plugin panic unwinds only that inner task — the
/// `JoinError` is caught here and converted into a synthesized `failed`
/// completion rather than propagating.
async fn dispatcher_loop(
    mut rx: mpsc::Receiver<JobRunId>,
    ctx: WorkerContext,
    max_workers: usize,
    active_workers: Arc<AtomicUsize>,
    cancel: CancellationToken,
) {
    let semaphore = Arc::new(Semaphore::new(max_workers));
    let mut in_flight: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe_job = rx.recv() => {
                let Some(job_run_id) = maybe_job else { break };
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => break,
                };
                active_workers.fetch_add(1, Ordering::Relaxed);
                let worker_ctx = ctx.clone();
                let worker_cancel = cancel.clone();
                let active = active_workers.clone();
                in_flight.spawn(async move {
                    dispatch_one(worker_ctx, job_run_id, worker_cancel).await;
                    drop(permit);
                    active.fetch_sub(1, Ordering::Relaxed);
                });
            }
            Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = result {
                    warn!(error = %e, "dispatcher: tracking task itself panicked (unexpected)");
                }
            }
        }
    }

    // Drain in-flight workers before returning so `stop()` genuinely waits
    // for everything to unwind.
    while let Some(result) = in_flight.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "dispatcher: tracking task itself panicked during drain (unexpected)");
        }
    }
}

/// Run one job inside its own isolated task; on panic, complete the JobRun as
/// `failed` with a synthesized message instead of letting the panic escape.
async fn dispatch_one(ctx: WorkerContext, job_run_id: JobRunId, cancel: CancellationToken) {
    let inner_ctx = ctx.clone();
    let handle = tokio::spawn(async move { run_job(inner_ctx, job_run_id, cancel).await });

    match handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(%job_run_id, error = %e, "job run returned an error"),
        Err(join_err) if join_err.is_panic() => {
            warn!(%job_run_id, error = %join_err, "worker panic contained");
            let completion = ingest_store::JobRunCompletion {
                status: JobRunStatus::Failed,
                error_message: Some(format!("worker panic: {join_err}")),
                counters: JobRunCounters::default(),
            };
            match ctx.schedule_store.complete_job_run(job_run_id, completion).await {
                Ok(_) => {}
                Err(ingest_store::StoreError::JobRunNotCompletable(_)) => {
                    debug!(%job_run_id, "panicked job run was already cancelled; nothing to record");
                }
                Err(e) => error!(%job_run_id, error = %e, "failed to record panicked job run as failed"),
            }
            ctx.broadcaster.publish(JobRunEvent::Completed { job_run_id, status: JobRunStatus::Failed });
        }
        Err(join_err) => {
            // Cancelled, not panicked — cleanup_stale_runs/release_expired_claims
            // will reclaim it on the next sweep.
            debug!(%job_run_id, error = %join_err, "worker task did not complete normally");
        }
    }
}

/// Every `claim_expiry`, release claims idle longer than `lease_expiry`.
async fn lease_cleanup_loop(store: Arc<dyn ScheduleStore>, config: SchedulerConfig, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(config.claim_expiry);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        match store.release_expired_claims(config.lease_expiry).await {
            Ok(count) if count > 0 => info!(count, "released expired claims"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "lease cleanup: release_expired_claims failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_plugin::DemoSource;
    use ingest_store::{InMemoryCatalog, InMemoryStore, NewSchedule};
    use std::collections::HashMap;
    use std::time::Duration;

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            max_workers: 4,
            scheduler_interval: Duration::from_millis(20),
            poll_interval: Duration::from_millis(20),
            claim_expiry: Duration::from_millis(20),
            lease_expiry: chrono::Duration::milliseconds(50),
            ..SchedulerConfig::default()
        }
    }

    #[tokio::test]
    async fn schedule_tick_creates_pending_job_and_advances_next_run() {
        let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
        let registry = Arc::new(PluginRegistry::new());
        registry.register(Arc::new(DemoSource::new())).await.unwrap();

        let schedule = store
            .create_schedule(NewSchedule {
                name: "ticker".to_string(),
                plugin_id: "demo".to_string(),
                config: HashMap::new(),
                cron_expression: "* * * * *".to_string(),
                enabled: true,
                created_by: None,
            })
            .await
            .unwrap();
        let original_next_run = schedule.next_run_at.unwrap();
        store.update_schedule_next_run(schedule.id, Some(chrono::Utc::now() - chrono::Duration::seconds(1))).await.unwrap();

        let scheduler = Scheduler::new(
            store.clone(),
            store.clone(),
            Arc::new(InMemoryCatalog::new()),
            registry,
            None,
            fast_config(),
        );
        let handle = scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;

        let runs = store.list_job_runs(ingest_store::JobRunFilter { schedule_id: Some(schedule.id), ..Default::default() }).await.unwrap();
        assert!(!runs.is_empty());
        let updated = store.get_schedule(schedule.id).await.unwrap();
        assert!(updated.next_run_at.unwrap() > original_next_run - chrono::Duration::minutes(2));
    }

    #[tokio::test]
    async fn claim_race_only_one_worker_wins() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.create_job_run(None, None).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let id = job.id;
            handles.push(tokio::spawn(async move { store.claim_job_run(id, &format!("w{i}")).await }));
        }
        let mut ok_count = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok_count += 1;
            }
        }
        assert_eq!(ok_count, 1);
    }

    #[tokio::test]
    async fn stop_drains_in_flight_workers() {
        let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
        let registry = Arc::new(PluginRegistry::new());
        registry.register(Arc::new(DemoSource::new())).await.unwrap();

        let scheduler = Scheduler::new(store.clone(), store.clone(), Arc::new(InMemoryCatalog::new()), registry, None, fast_config());
        let handle = scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop().await;
    }
}
