use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingest_domain::{
    EntityType, JobRun, JobRunCounters, JobRunId, JobRunStatus, Run, RunCheckpoint, RunEntity, RunId, Schedule,
    ScheduleId,
};
use serde_json::Value;

use crate::error::StoreError;

/// Checkpoints belonging to one prior Run, keyed by `(entity_type, entity_mrn)`.
pub type CheckpointMap = HashMap<(EntityType, String), RunCheckpoint>;

/// Fields needed to create a [`Schedule`]; the store assigns `id`, timestamps,
/// and the initial `next_run_at`.
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub name: String,
    pub plugin_id: String,
    pub config: HashMap<String, Value>,
    pub cron_expression: String,
    pub enabled: bool,
    pub created_by: Option<String>,
}

/// Filter predicate for listing schedules.
#[derive(Debug, Clone, Default)]
pub struct ScheduleFilter {
    pub enabled: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

/// Filter predicate for listing job runs.
#[derive(Debug, Clone, Default)]
pub struct JobRunFilter {
    pub schedule_id: Option<ScheduleId>,
    pub status: Option<JobRunStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// Terminal outcome reported by a worker onto a [`JobRun`].
#[derive(Debug, Clone)]
pub struct JobRunCompletion {
    pub status: JobRunStatus,
    pub error_message: Option<String>,
    pub counters: JobRunCounters,
}

/// Durable storage for [`Schedule`]s and the [`JobRun`]s they dispatch.
///
/// Config returned to callers outside a worker is always masked; only the
/// worker path sees the decrypted/raw form (see `ingest-secrets`).
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn create_schedule(&self, new: NewSchedule) -> Result<Schedule, StoreError>;
    async fn update_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError>;
    async fn get_schedule(&self, id: ScheduleId) -> Result<Schedule, StoreError>;
    async fn list_schedules(&self, filter: ScheduleFilter) -> Result<Vec<Schedule>, StoreError>;
    async fn delete_schedule(&self, id: ScheduleId) -> Result<(), StoreError>;

    /// Enabled schedules whose `next_run_at` has arrived, oldest first.
    async fn get_schedules_due_for_run(&self, limit: i64) -> Result<Vec<Schedule>, StoreError>;
    async fn update_schedule_next_run(&self, id: ScheduleId, next_run_at: Option<DateTime<Utc>>) -> Result<(), StoreError>;

    async fn create_job_run(&self, schedule_id: Option<ScheduleId>, created_by: Option<String>) -> Result<JobRun, StoreError>;
    async fn get_job_run(&self, id: JobRunId) -> Result<JobRun, StoreError>;
    async fn list_job_runs(&self, filter: JobRunFilter) -> Result<Vec<JobRun>, StoreError>;

    /// True if a non-terminal `JobRun` already exists for the schedule.
    async fn has_active_job_run(&self, schedule_id: ScheduleId) -> Result<bool, StoreError>;

    /// `WHERE id=? AND status='pending'`; zero rows affected is `JobRunNotClaimable`.
    async fn claim_job_run(&self, id: JobRunId, worker: &str) -> Result<JobRun, StoreError>;
    async fn start_job_run(&self, id: JobRunId) -> Result<JobRun, StoreError>;
    async fn set_job_run_plugin_run_id(&self, id: JobRunId, run_id: RunId) -> Result<(), StoreError>;
    async fn complete_job_run(&self, id: JobRunId, completion: JobRunCompletion) -> Result<JobRun, StoreError>;
    async fn cancel_job_run(&self, id: JobRunId) -> Result<JobRun, StoreError>;

    /// Releases claims idle longer than `expiry`; returns the count released.
    async fn release_expired_claims(&self, expiry: chrono::Duration) -> Result<u64, StoreError>;
}

/// Durable storage for plugin [`Run`]s, their [`RunEntity`] outcomes, and the
/// [`RunCheckpoint`]s that drive the next run's diff.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_run(&self, run: Run) -> Result<Run, StoreError>;
    async fn update_run(&self, run: Run) -> Result<Run, StoreError>;
    async fn get_run(&self, id: RunId) -> Result<Run, StoreError>;

    async fn add_run_entity(&self, entity: RunEntity) -> Result<(), StoreError>;
    async fn list_run_entities(&self, run_id: RunId) -> Result<Vec<RunEntity>, StoreError>;

    /// UPSERT on `(run_id, entity_type, entity_mrn)`.
    async fn add_checkpoint(&self, checkpoint: RunCheckpoint) -> Result<(), StoreError>;

    /// Checkpoints belonging to the most recent `completed` Run for
    /// `(pipeline_name, source_name)`. Empty if none exists yet.
    async fn get_last_run_checkpoints(&self, pipeline_name: &str, source_name: &str) -> Result<CheckpointMap, StoreError>;

    /// Every distinct `source_name` that has ever produced a Run for `pipeline_name`.
    async fn list_sources_for_pipeline(&self, pipeline_name: &str) -> Result<Vec<String>, StoreError>;

    /// Deletes all checkpoints ever recorded for `pipeline_name`, across all sources.
    async fn clear_pipeline_checkpoints(&self, pipeline_name: &str) -> Result<(), StoreError>;

    /// Flips any `Run` still `running` whose `started_at` is older than
    /// `timeout` to `failed`; returns the count affected.
    async fn cleanup_stale_runs(&self, timeout: chrono::Duration) -> Result<u64, StoreError>;
}

pub(crate) fn terminal_completion_status(status: JobRunStatus) -> Result<(), StoreError> {
    if matches!(status, JobRunStatus::Succeeded | JobRunStatus::Failed) {
        Ok(())
    } else {
        Err(StoreError::Conflict(format!("{status} is not a terminal completion status")))
    }
}
