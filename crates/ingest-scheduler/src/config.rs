use std::time::Duration;

use ingest_config::ProcessConfig;

/// Tuning knobs for one [`crate::Scheduler`] instance. One instance runs per
/// process; there is no distributed coordination beyond the store's SQL-level
/// atomicity (see the design notes on the single-DB coordination point).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Concurrency cap across all in-flight workers.
    pub max_workers: usize,
    /// How often the schedule loop scans for due schedules.
    pub scheduler_interval: Duration,
    /// After this long claimed-without-progress, a claim is released.
    pub lease_expiry: chrono::Duration,
    /// Period of the claim-release sweep loop.
    pub claim_expiry: Duration,
    /// Backpressure bound on the in-memory dispatcher queue.
    pub job_queue_capacity: usize,
    /// If false, the schedule loop skips creating a new pending JobRun when a
    /// non-terminal one already exists for that schedule.
    pub allow_overlapping_runs: bool,
    /// Wall-clock past which a still-`running` plugin Run is force-failed by
    /// the stale-run sweep.
    pub stale_run_timeout: chrono::Duration,
    /// How often the pending-jobs poller drains the store into the queue.
    pub poll_interval: Duration,
    /// How many pending jobs the poller pulls per tick.
    pub poll_batch_size: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            scheduler_interval: Duration::from_secs(60),
            lease_expiry: chrono::Duration::minutes(5),
            claim_expiry: Duration::from_secs(30),
            job_queue_capacity: 100,
            allow_overlapping_runs: true,
            stale_run_timeout: chrono::Duration::hours(1),
            poll_interval: Duration::from_secs(2),
            poll_batch_size: 50,
        }
    }
}

impl From<&ProcessConfig> for SchedulerConfig {
    fn from(p: &ProcessConfig) -> Self {
        Self {
            max_workers: p.max_workers,
            scheduler_interval: Duration::from_secs(p.scheduler_interval_secs),
            lease_expiry: chrono::Duration::seconds(p.lease_expiry_secs as i64),
            claim_expiry: Duration::from_secs(p.claim_expiry_secs),
            job_queue_capacity: p.job_queue_capacity,
            allow_overlapping_runs: p.allow_overlapping_runs,
            stale_run_timeout: chrono::Duration::seconds(p.stale_run_timeout_secs as i64),
            ..Self::default()
        }
    }
}
