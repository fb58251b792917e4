use clap::Args;

/// Process-wide configuration loaded from the environment, mirroring the
/// CLI's `env`-attribute pattern. Embedded into the `serve` subcommand via
/// `#[command(flatten)]`.
#[derive(Debug, Clone, Args)]
pub struct ProcessConfig {
    /// Postgres connection string. Absent falls back to the in-memory store
    /// (local/demo mode — state does not survive a restart).
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Base64-encoded 32-byte AES-256-GCM key. Required to store schedules
    /// with sensitive fields; generate one with `generate-encryption-key`.
    #[arg(long, env = "ENCRYPTION_KEY")]
    pub encryption_key: Option<String>,

    /// Address the HTTP surface binds to.
    #[arg(long, env = "INGEST_BIND", default_value = "0.0.0.0:8090")]
    pub bind: String,

    /// Bearer token required on every HTTP request.
    #[arg(long, env = "INGEST_TOKEN")]
    pub token: Option<String>,

    /// Concurrency cap across all in-flight workers.
    #[arg(long, env = "INGEST_MAX_WORKERS", default_value_t = 10)]
    pub max_workers: usize,

    /// How often (seconds) to scan for due schedules.
    #[arg(long, env = "INGEST_SCHEDULER_INTERVAL_SECS", default_value_t = 60)]
    pub scheduler_interval_secs: u64,

    /// After this long (seconds) claimed-without-progress, release the claim.
    #[arg(long, env = "INGEST_LEASE_EXPIRY_SECS", default_value_t = 300)]
    pub lease_expiry_secs: u64,

    /// Period (seconds) of the claim-release sweep loop.
    #[arg(long, env = "INGEST_CLAIM_EXPIRY_SECS", default_value_t = 30)]
    pub claim_expiry_secs: u64,

    /// Backpressure bound on the in-memory dispatcher queue.
    #[arg(long, env = "INGEST_JOB_QUEUE_CAPACITY", default_value_t = 100)]
    pub job_queue_capacity: usize,

    /// If true, a schedule tick still creates a new pending JobRun even when
    /// one is already non-terminal for that schedule.
    #[arg(long, env = "INGEST_ALLOW_OVERLAPPING_RUNS", default_value_t = true)]
    pub allow_overlapping_runs: bool,

    /// Wall-clock (seconds) past which a still-`running` plugin Run is
    /// force-failed by the stale-run sweep.
    #[arg(long, env = "INGEST_STALE_RUN_TIMEOUT_SECS", default_value_t = 3600)]
    pub stale_run_timeout_secs: u64,
}
