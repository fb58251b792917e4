pub mod config_spec;
pub mod discovery;
pub mod error;
pub mod ids;
pub mod mrn;
pub mod run;
pub mod schedule;

pub use config_spec::{ConfigField, ConfigFieldType, ConfigSpec, Validation};
pub use discovery::{Asset, AssetRunHistory, Documentation, ExternalLink, LineageEdge, Statistic, DiscoveryResult};
pub use error::{DomainError, FieldError};
pub use ids::{JobRunId, RunId, ScheduleId};
pub use mrn::Mrn;
pub use run::{CheckpointOperation, EntityType, Run, RunCheckpoint, RunEntity, RunEntityStatus, RunStatus, RunSummary};
pub use schedule::{JobRun, JobRunCounters, JobRunStatus, Schedule};
