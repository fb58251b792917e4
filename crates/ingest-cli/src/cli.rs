use clap::{Parser, Subcommand};
use ingest_config::ProcessConfig;

#[derive(Debug, Parser)]
#[command(
    name = "ingestctl",
    about = "Metadata ingestion orchestrator: scheduler, HTTP surface, and operator CLI",
    version
)]
pub struct Cli {
    /// Base URL of a running server. Every subcommand except `serve` and
    /// `generate-encryption-key` talks to this over HTTP.
    #[arg(long, env = "INGEST_URL", global = true, default_value = "http://localhost:8090")]
    pub url: String,

    /// Bearer token for the server above.
    #[arg(long, env = "INGEST_TOKEN", global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler and HTTP surface in-process.
    Serve {
        #[command(flatten)]
        process: ProcessConfig,
    },

    /// Generate a base64-encoded AES-256-GCM key for ENCRYPTION_KEY.
    GenerateEncryptionKey,

    #[command(subcommand)]
    Schedule(ScheduleCommand),

    #[command(subcommand)]
    Job(JobCommand),

    /// Validate a plugin config against its ConfigSpec without creating a schedule.
    Validate {
        plugin_id: String,
        /// Path to a JSON file holding the config. Reads stdin if omitted.
        config_file: Option<String>,
    },

    /// List registered plugins and their config specs.
    Plugins,

    /// Tear down every entity a pipeline has ever produced and clear its checkpoints.
    Destroy {
        pipeline_name: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum ScheduleCommand {
    /// Create a schedule.
    Create {
        name: String,
        plugin_id: String,
        cron_expression: String,
        /// Path to a JSON file holding the config. Reads stdin if omitted.
        config_file: Option<String>,
        #[arg(long)]
        disabled: bool,
    },
    /// List schedules.
    List {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Show one schedule.
    Get { id: String },
    /// Delete a schedule.
    Delete { id: String },
    /// Enqueue a pending run for a schedule right now.
    Run { id: String },
}

#[derive(Debug, Subcommand)]
pub enum JobCommand {
    /// List job runs.
    List {
        #[arg(long)]
        schedule_id: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Cancel a job run.
    Cancel { id: String },
}
