mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command, JobCommand, ScheduleCommand};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_target(false).init();

    let cli = Cli::parse();
    let url = cli.url;
    let token = cli.token;

    match cli.command {
        Command::Serve { process } => commands::serve(process).await,
        Command::GenerateEncryptionKey => commands::generate_encryption_key(),
        Command::Schedule(cmd) => match cmd {
            ScheduleCommand::Create { name, plugin_id, cron_expression, config_file, disabled } => {
                commands::schedule_create(&url, token, name, plugin_id, cron_expression, config_file, disabled).await
            }
            ScheduleCommand::List { enabled, limit, offset } => commands::schedule_list(&url, token, enabled, limit, offset).await,
            ScheduleCommand::Get { id } => commands::schedule_get(&url, token, id).await,
            ScheduleCommand::Delete { id } => commands::schedule_delete(&url, token, id).await,
            ScheduleCommand::Run { id } => commands::schedule_run(&url, token, id).await,
        },
        Command::Job(cmd) => match cmd {
            JobCommand::List { schedule_id, status, limit, offset } => {
                commands::job_list(&url, token, schedule_id, status, limit, offset).await
            }
            JobCommand::Cancel { id } => commands::job_cancel(&url, token, id).await,
        },
        Command::Validate { plugin_id, config_file } => commands::validate(&url, token, plugin_id, config_file).await,
        Command::Plugins => commands::plugins(&url, token).await,
        Command::Destroy { pipeline_name, yes } => commands::destroy(&url, token, pipeline_name, yes).await,
    }
}
