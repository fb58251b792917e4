use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{JobRunId, RunId, ScheduleId};

/// A named, operator-defined ingestion pipeline: a plugin plus its config and
/// cron schedule. `config` holds sensitive fields encrypted at rest — callers
/// outside a worker must see the masked form (see `ingest-config::mask`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub name: String,
    pub plugin_id: String,
    pub config: HashMap<String, Value>,
    /// Standard 5-field cron expression. Empty string means manual-only.
    pub cron_expression: String,
    pub enabled: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn is_manual_only(&self) -> bool {
        self.cron_expression.is_empty()
    }
}

/// Lifecycle state of a [`JobRun`].
///
/// Transitions:
///   pending -> claimed -> running -> succeeded | failed
///   pending | claimed | running -> cancelled
///   claimed -> pending (lease expiry)
/// `succeeded`, `failed`, `cancelled` are terminal; no re-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
    Pending,
    Claimed,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobRunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobRunStatus::Succeeded | JobRunStatus::Failed | JobRunStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobRunStatus::Pending => "pending",
            JobRunStatus::Claimed => "claimed",
            JobRunStatus::Running => "running",
            JobRunStatus::Succeeded => "succeeded",
            JobRunStatus::Failed => "failed",
            JobRunStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobRunStatus::Pending),
            "claimed" => Ok(JobRunStatus::Claimed),
            "running" => Ok(JobRunStatus::Running),
            "succeeded" => Ok(JobRunStatus::Succeeded),
            "failed" => Ok(JobRunStatus::Failed),
            "cancelled" => Ok(JobRunStatus::Cancelled),
            other => Err(format!("unknown job run status: {other}")),
        }
    }
}

/// Aggregate counters a worker reports back onto its JobRun at completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JobRunCounters {
    pub assets_created: u64,
    pub assets_updated: u64,
    pub assets_deleted: u64,
    pub lineage_created: u64,
    pub documentation_added: u64,
}

/// One attempt at executing a schedule, or an ad-hoc manually-triggered run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: JobRunId,
    pub schedule_id: Option<ScheduleId>,
    pub plugin_run_id: Option<RunId>,
    pub status: JobRunStatus,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub counters: JobRunCounters,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
