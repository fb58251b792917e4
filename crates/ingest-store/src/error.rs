use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("schedule not found: {0}")]
    ScheduleNotFound(String),

    #[error("job run not found: {0}")]
    JobRunNotFound(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("a schedule named '{0}' already exists")]
    ScheduleNameExists(String),

    #[error("invalid cron expression: {0}")]
    InvalidCronExpression(String),

    #[error("job run '{0}' is not claimable (already claimed, running, or terminal)")]
    JobRunNotClaimable(String),

    #[error("job run '{0}' is not startable (not pending or claimed)")]
    JobRunNotStartable(String),

    #[error("job run '{0}' is not completable (not running or claimed)")]
    JobRunNotCompletable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),
}
