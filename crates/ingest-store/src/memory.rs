use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use ingest_domain::{
    EntityType, JobRun, JobRunId, JobRunStatus, Run, RunCheckpoint, RunEntity, RunId, RunStatus, Schedule, ScheduleId,
};
use tokio::sync::RwLock;

use crate::cron_util::calculate_next_run;
use crate::error::StoreError;
use crate::store::{
    terminal_completion_status, CheckpointMap, JobRunCompletion, JobRunFilter, NewSchedule, RunStore, ScheduleFilter,
    ScheduleStore,
};

#[derive(Default)]
struct Inner {
    schedules: HashMap<ScheduleId, Schedule>,
    job_runs: HashMap<JobRunId, JobRun>,
    runs: HashMap<RunId, Run>,
    run_entities: HashMap<RunId, Vec<RunEntity>>,
    checkpoints: HashMap<RunId, Vec<RunCheckpoint>>,
}

/// In-memory `ScheduleStore` + `RunStore`, used by tests and by deployments
/// that don't need durability across restarts.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryStore {
    async fn create_schedule(&self, new: NewSchedule) -> Result<Schedule, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.schedules.values().any(|s| s.name == new.name) {
            return Err(StoreError::ScheduleNameExists(new.name));
        }
        let now = Utc::now();
        let next_run_at = if new.cron_expression.is_empty() {
            None
        } else {
            Some(calculate_next_run(&new.cron_expression, now)?)
        };
        let schedule = Schedule {
            id: ScheduleId::new(),
            name: new.name,
            plugin_id: new.plugin_id,
            config: new.config,
            cron_expression: new.cron_expression,
            enabled: new.enabled,
            next_run_at,
            last_run_at: None,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        inner.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn update_schedule(&self, mut schedule: Schedule) -> Result<Schedule, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.schedules.contains_key(&schedule.id) {
            return Err(StoreError::ScheduleNotFound(schedule.id.to_string()));
        }
        if inner.schedules.values().any(|s| s.id != schedule.id && s.name == schedule.name) {
            return Err(StoreError::ScheduleNameExists(schedule.name));
        }
        if !schedule.cron_expression.is_empty() {
            crate::cron_util::validate_cron(&schedule.cron_expression)?;
        }
        schedule.updated_at = Utc::now();
        inner.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn get_schedule(&self, id: ScheduleId) -> Result<Schedule, StoreError> {
        self.inner
            .read()
            .await
            .schedules
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::ScheduleNotFound(id.to_string()))
    }

    async fn list_schedules(&self, filter: ScheduleFilter) -> Result<Vec<Schedule>, StoreError> {
        let inner = self.inner.read().await;
        let mut schedules: Vec<Schedule> = inner
            .schedules
            .values()
            .filter(|s| filter.enabled.is_none_or(|e| s.enabled == e))
            .cloned()
            .collect();
        schedules.sort_by_key(|s| s.created_at);
        Ok(paginate(schedules, filter.limit, filter.offset))
    }

    async fn delete_schedule(&self, id: ScheduleId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.schedules.remove(&id).is_none() {
            return Err(StoreError::ScheduleNotFound(id.to_string()));
        }
        inner.job_runs.retain(|_, j| j.schedule_id != Some(id));
        Ok(())
    }

    async fn get_schedules_due_for_run(&self, limit: i64) -> Result<Vec<Schedule>, StoreError> {
        let now = Utc::now();
        let inner = self.inner.read().await;
        let mut due: Vec<Schedule> = inner
            .schedules
            .values()
            .filter(|s| s.enabled && s.next_run_at.is_some_and(|t| t <= now))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_run_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn update_schedule_next_run(
        &self,
        id: ScheduleId,
        next_run_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let schedule = inner.schedules.get_mut(&id).ok_or_else(|| StoreError::ScheduleNotFound(id.to_string()))?;
        schedule.next_run_at = next_run_at;
        schedule.updated_at = Utc::now();
        Ok(())
    }

    async fn create_job_run(&self, schedule_id: Option<ScheduleId>, created_by: Option<String>) -> Result<JobRun, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(id) = schedule_id {
            if !inner.schedules.contains_key(&id) {
                return Err(StoreError::ScheduleNotFound(id.to_string()));
            }
        }
        let now = Utc::now();
        let job_run = JobRun {
            id: JobRunId::new(),
            schedule_id,
            plugin_run_id: None,
            status: JobRunStatus::Pending,
            claimed_by: None,
            claimed_at: None,
            started_at: None,
            finished_at: None,
            error_message: None,
            counters: Default::default(),
            created_by,
            created_at: now,
            updated_at: now,
        };
        inner.job_runs.insert(job_run.id, job_run.clone());
        Ok(job_run)
    }

    async fn get_job_run(&self, id: JobRunId) -> Result<JobRun, StoreError> {
        self.inner
            .read()
            .await
            .job_runs
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::JobRunNotFound(id.to_string()))
    }

    async fn list_job_runs(&self, filter: JobRunFilter) -> Result<Vec<JobRun>, StoreError> {
        let inner = self.inner.read().await;
        let mut runs: Vec<JobRun> = inner
            .job_runs
            .values()
            .filter(|j| filter.schedule_id.is_none_or(|id| j.schedule_id == Some(id)))
            .filter(|j| filter.status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        runs.sort_by_key(|j| j.created_at);
        Ok(paginate(runs, filter.limit, filter.offset))
    }

    async fn has_active_job_run(&self, schedule_id: ScheduleId) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .job_runs
            .values()
            .any(|j| j.schedule_id == Some(schedule_id) && !j.status.is_terminal()))
    }

    async fn claim_job_run(&self, id: JobRunId, worker: &str) -> Result<JobRun, StoreError> {
        let mut inner = self.inner.write().await;
        let job_run = inner.job_runs.get_mut(&id).ok_or_else(|| StoreError::JobRunNotFound(id.to_string()))?;
        if job_run.status != JobRunStatus::Pending {
            return Err(StoreError::JobRunNotClaimable(id.to_string()));
        }
        job_run.status = JobRunStatus::Claimed;
        job_run.claimed_by = Some(worker.to_string());
        job_run.claimed_at = Some(Utc::now());
        job_run.updated_at = Utc::now();
        Ok(job_run.clone())
    }

    async fn start_job_run(&self, id: JobRunId) -> Result<JobRun, StoreError> {
        let mut inner = self.inner.write().await;
        let job_run = inner.job_runs.get_mut(&id).ok_or_else(|| StoreError::JobRunNotFound(id.to_string()))?;
        if !matches!(job_run.status, JobRunStatus::Pending | JobRunStatus::Claimed) {
            return Err(StoreError::JobRunNotStartable(id.to_string()));
        }
        job_run.status = JobRunStatus::Running;
        job_run.started_at = Some(Utc::now());
        job_run.updated_at = Utc::now();
        Ok(job_run.clone())
    }

    async fn set_job_run_plugin_run_id(&self, id: JobRunId, run_id: RunId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let job_run = inner.job_runs.get_mut(&id).ok_or_else(|| StoreError::JobRunNotFound(id.to_string()))?;
        job_run.plugin_run_id = Some(run_id);
        job_run.updated_at = Utc::now();
        Ok(())
    }

    async fn complete_job_run(&self, id: JobRunId, completion: JobRunCompletion) -> Result<JobRun, StoreError> {
        terminal_completion_status(completion.status)?;
        let mut inner = self.inner.write().await;
        let schedule_id = {
            let job_run = inner.job_runs.get_mut(&id).ok_or_else(|| StoreError::JobRunNotFound(id.to_string()))?;
            if !matches!(job_run.status, JobRunStatus::Running | JobRunStatus::Claimed) {
                return Err(StoreError::JobRunNotCompletable(id.to_string()));
            }
            job_run.status = completion.status;
            job_run.error_message = completion.error_message;
            job_run.counters = completion.counters;
            job_run.finished_at = Some(Utc::now());
            job_run.updated_at = Utc::now();
            job_run.schedule_id
        };
        if let Some(schedule_id) = schedule_id {
            if let Some(schedule) = inner.schedules.get_mut(&schedule_id) {
                schedule.last_run_at = Some(Utc::now());
                schedule.updated_at = Utc::now();
            }
        }
        Ok(inner.job_runs.get(&id).cloned().expect("just written"))
    }

    async fn cancel_job_run(&self, id: JobRunId) -> Result<JobRun, StoreError> {
        let mut inner = self.inner.write().await;
        let job_run = inner.job_runs.get_mut(&id).ok_or_else(|| StoreError::JobRunNotFound(id.to_string()))?;
        if job_run.status.is_terminal() {
            return Err(StoreError::Conflict(format!("job run {id} already terminal")));
        }
        job_run.status = JobRunStatus::Cancelled;
        job_run.finished_at = Some(Utc::now());
        job_run.updated_at = Utc::now();
        Ok(job_run.clone())
    }

    async fn release_expired_claims(&self, expiry: chrono::Duration) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let mut released = 0u64;
        for job_run in inner.job_runs.values_mut() {
            if job_run.status == JobRunStatus::Claimed && job_run.claimed_at.is_some_and(|t| now - t > expiry) {
                job_run.status = JobRunStatus::Pending;
                job_run.claimed_by = None;
                job_run.claimed_at = None;
                job_run.updated_at = now;
                released += 1;
            }
        }
        Ok(released)
    }
}

#[async_trait]
impl RunStore for InMemoryStore {
    async fn create_run(&self, run: Run) -> Result<Run, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.runs.contains_key(&run.id) {
            return Err(StoreError::Conflict(format!("run {} already exists", run.id)));
        }
        inner.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn update_run(&self, run: Run) -> Result<Run, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.runs.contains_key(&run.id) {
            return Err(StoreError::RunNotFound(run.id.to_string()));
        }
        inner.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn get_run(&self, id: RunId) -> Result<Run, StoreError> {
        self.inner.read().await.runs.get(&id).cloned().ok_or_else(|| StoreError::RunNotFound(id.to_string()))
    }

    async fn add_run_entity(&self, entity: RunEntity) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let entities = inner.run_entities.entry(entity.run_id).or_default();
        entities.retain(|e| !(e.entity_type == entity.entity_type && e.entity_mrn == entity.entity_mrn));
        entities.push(entity);
        Ok(())
    }

    async fn list_run_entities(&self, run_id: RunId) -> Result<Vec<RunEntity>, StoreError> {
        Ok(self.inner.read().await.run_entities.get(&run_id).cloned().unwrap_or_default())
    }

    async fn add_checkpoint(&self, checkpoint: RunCheckpoint) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let checkpoints = inner.checkpoints.entry(checkpoint.run_id).or_default();
        checkpoints.retain(|c| !(c.entity_type == checkpoint.entity_type && c.entity_mrn == checkpoint.entity_mrn));
        checkpoints.push(checkpoint);
        Ok(())
    }

    async fn get_last_run_checkpoints(&self, pipeline_name: &str, source_name: &str) -> Result<CheckpointMap, StoreError> {
        let inner = self.inner.read().await;
        let last_run = inner
            .runs
            .values()
            .filter(|r| r.pipeline_name == pipeline_name && r.source_name == source_name && r.status == RunStatus::Completed)
            .max_by_key(|r| r.completed_at);
        let Some(run) = last_run else {
            return Ok(HashMap::new());
        };
        let map = inner
            .checkpoints
            .get(&run.id)
            .into_iter()
            .flatten()
            .map(|c| ((c.entity_type, c.entity_mrn.clone()), c.clone()))
            .collect();
        Ok(map)
    }

    async fn list_sources_for_pipeline(&self, pipeline_name: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read().await;
        let mut sources: Vec<String> =
            inner.runs.values().filter(|r| r.pipeline_name == pipeline_name).map(|r| r.source_name.clone()).collect();
        sources.sort();
        sources.dedup();
        Ok(sources)
    }

    async fn clear_pipeline_checkpoints(&self, pipeline_name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let run_ids: Vec<RunId> = inner.runs.values().filter(|r| r.pipeline_name == pipeline_name).map(|r| r.id).collect();
        for run_id in run_ids {
            inner.checkpoints.remove(&run_id);
        }
        Ok(())
    }

    async fn cleanup_stale_runs(&self, timeout: chrono::Duration) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let mut count = 0u64;
        for run in inner.runs.values_mut() {
            if run.status == RunStatus::Running && now - run.started_at > timeout {
                run.status = RunStatus::Failed;
                run.completed_at = Some(now);
                run.error_message = Some("run timed out: no progress within stale_run_timeout".to_string());
                count += 1;
            }
        }
        Ok(count)
    }
}

fn paginate<T>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    let offset = offset.max(0) as usize;
    let mut iter = items.into_iter().skip(offset);
    if limit <= 0 {
        iter.collect()
    } else {
        iter.by_ref().take(limit as usize).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_domain::RunSummary;
    use std::collections::HashMap as Map;

    fn new_schedule_fixture(name: &str, cron: &str) -> NewSchedule {
        NewSchedule {
            name: name.to_string(),
            plugin_id: "demo".to_string(),
            config: Map::new(),
            cron_expression: cron.to_string(),
            enabled: true,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn duplicate_schedule_name_rejected() {
        let store = InMemoryStore::new();
        store.create_schedule(new_schedule_fixture("a", "")).await.unwrap();
        let err = store.create_schedule(new_schedule_fixture("a", "")).await.unwrap_err();
        assert!(matches!(err, StoreError::ScheduleNameExists(_)));
    }

    #[tokio::test]
    async fn manual_only_schedule_has_no_next_run() {
        let store = InMemoryStore::new();
        let schedule = store.create_schedule(new_schedule_fixture("manual", "")).await.unwrap();
        assert!(schedule.next_run_at.is_none());
    }

    #[tokio::test]
    async fn scheduled_creation_sets_next_run_in_future() {
        let store = InMemoryStore::new();
        let schedule = store.create_schedule(new_schedule_fixture("ticking", "*/5 * * * *")).await.unwrap();
        assert!(schedule.next_run_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn only_one_claim_wins_the_race() {
        let store = Arc::new(InMemoryStore::new());
        let job = store.create_job_run(None, None).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let id = job.id;
            handles.push(tokio::spawn(async move { store.claim_job_run(id, &format!("worker-{i}")).await }));
        }
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        let ok_count = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok_count, 1);
    }

    #[tokio::test]
    async fn cancelled_job_run_cannot_be_started_or_completed() {
        let store = InMemoryStore::new();
        let job = store.create_job_run(None, None).await.unwrap();
        store.cancel_job_run(job.id).await.unwrap();

        let err = store.start_job_run(job.id).await.unwrap_err();
        assert!(matches!(err, StoreError::JobRunNotStartable(_)));

        let err = store
            .complete_job_run(
                job.id,
                JobRunCompletion { status: JobRunStatus::Succeeded, error_message: None, counters: Default::default() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::JobRunNotCompletable(_)));
        assert_eq!(store.get_job_run(job.id).await.unwrap().status, JobRunStatus::Cancelled);
    }

    #[tokio::test]
    async fn update_schedule_next_run_does_not_touch_last_run_at() {
        let store = InMemoryStore::new();
        let schedule = store.create_schedule(new_schedule_fixture("ticking", "*/5 * * * *")).await.unwrap();
        assert!(schedule.last_run_at.is_none());
        store.update_schedule_next_run(schedule.id, Some(Utc::now())).await.unwrap();
        let updated = store.get_schedule(schedule.id).await.unwrap();
        assert!(updated.last_run_at.is_none());
    }

    #[tokio::test]
    async fn expired_claims_are_released() {
        let store = InMemoryStore::new();
        let job = store.create_job_run(None, None).await.unwrap();
        store.claim_job_run(job.id, "w1").await.unwrap();
        {
            let mut inner = store.inner.write().await;
            let j = inner.job_runs.get_mut(&job.id).unwrap();
            j.claimed_at = Some(Utc::now() - chrono::Duration::minutes(10));
        }
        let released = store.release_expired_claims(chrono::Duration::minutes(5)).await.unwrap();
        assert_eq!(released, 1);
        assert_eq!(store.get_job_run(job.id).await.unwrap().status, JobRunStatus::Pending);
    }

    #[tokio::test]
    async fn checkpoint_lookup_uses_most_recent_completed_run() {
        let store = InMemoryStore::new();
        let older = Run {
            id: RunId::new(),
            pipeline_name: "p".to_string(),
            source_name: "demo".to_string(),
            status: RunStatus::Completed,
            started_at: Utc::now() - chrono::Duration::hours(2),
            completed_at: Some(Utc::now() - chrono::Duration::hours(2)),
            error_message: None,
            config: Map::new(),
            summary: Some(RunSummary::default()),
            created_by: None,
        };
        let newer = Run { id: RunId::new(), completed_at: Some(Utc::now()), ..older.clone() };
        RunStore::create_run(&store, older.clone()).await.unwrap();
        RunStore::create_run(&store, newer.clone()).await.unwrap();

        let checkpoint = RunCheckpoint {
            run_id: newer.id,
            entity_type: EntityType::Asset,
            entity_mrn: "mrn://file/demo/a".to_string(),
            operation: ingest_domain::CheckpointOperation::Created,
            source_fields: vec!["hash1".to_string()],
            created_at: Utc::now(),
        };
        store.add_checkpoint(checkpoint.clone()).await.unwrap();

        let map = store.get_last_run_checkpoints("p", "demo").await.unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&(EntityType::Asset, "mrn://file/demo/a".to_string())));
    }

    #[tokio::test]
    async fn stale_running_runs_are_failed() {
        let store = InMemoryStore::new();
        let run = Run {
            id: RunId::new(),
            pipeline_name: "p".to_string(),
            source_name: "demo".to_string(),
            status: RunStatus::Running,
            started_at: Utc::now() - chrono::Duration::hours(3),
            completed_at: None,
            error_message: None,
            config: Map::new(),
            summary: None,
            created_by: None,
        };
        RunStore::create_run(&store, run.clone()).await.unwrap();
        let count = store.cleanup_stale_runs(chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.get_run(run.id).await.unwrap().status, RunStatus::Failed);
    }
}
