use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::RunId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// Counts + duration recorded on a Run once it reaches a terminal state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub assets_created: u64,
    pub assets_updated: u64,
    pub assets_unchanged: u64,
    pub assets_deleted: u64,
    pub lineage_created: u64,
    pub lineage_updated: u64,
    pub documentation_created: u64,
    pub documentation_updated: u64,
    pub duration_ms: u64,
}

/// The discovery event produced by executing a plugin inside a JobRun.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub pipeline_name: String,
    pub source_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Masked for display; never the decrypted config.
    pub config: HashMap<String, Value>,
    pub summary: Option<RunSummary>,
    pub created_by: Option<String>,
}

impl Run {
    /// The opaque run identifier surfaced to callers. Implemented as equal to
    /// the DB id in this repo (see Open Questions in the design notes).
    pub fn run_id(&self) -> RunId {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Asset,
    Lineage,
    Documentation,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Asset => "asset",
            EntityType::Lineage => "lineage",
            EntityType::Documentation => "documentation",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEntityStatus {
    Created,
    Updated,
    Unchanged,
    Deleted,
    Failed,
}

impl RunEntityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunEntityStatus::Created => "created",
            RunEntityStatus::Updated => "updated",
            RunEntityStatus::Unchanged => "unchanged",
            RunEntityStatus::Deleted => "deleted",
            RunEntityStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunEntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-entity outcome within a Run. Unique on `(run_id, entity_type, entity_mrn)`;
/// re-inserts upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEntity {
    pub run_id: RunId,
    pub entity_type: EntityType,
    pub entity_mrn: String,
    pub entity_name: Option<String>,
    pub status: RunEntityStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointOperation {
    Created,
    Updated,
    Unchanged,
    Deleted,
}

impl CheckpointOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointOperation::Created => "created",
            CheckpointOperation::Updated => "updated",
            CheckpointOperation::Unchanged => "unchanged",
            CheckpointOperation::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for CheckpointOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persistent memory of what a pipeline "owned" after its last successful
/// run. For assets, `source_fields[0]` is the content hash; the diff engine
/// reads nothing else from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub run_id: RunId,
    pub entity_type: EntityType,
    pub entity_mrn: String,
    pub operation: CheckpointOperation,
    pub source_fields: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl RunCheckpoint {
    /// The content hash recorded for an asset checkpoint, if any.
    pub fn content_hash(&self) -> Option<&str> {
        self.source_fields.first().map(String::as_str)
    }
}
