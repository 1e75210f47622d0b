mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Command};
use sqlx::postgres::PgPoolOptions;
use taskgraph_core::SchedulerConfig;
use taskgraph_postgres::PgQueueStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            err.exit_code()
        }
    };

    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<(), taskgraph_core::SchedulerError> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&cli.database_url)
        .await
        .map_err(|e| taskgraph_core::SchedulerError::Database(anyhow::Error::new(e)))?;

    let config = SchedulerConfig::from_env();
    let store = PgQueueStore::new(pool, &config);

    match cli.command {
        Command::Queue(cmd) => commands::run_queue_command(&store, cmd).await,
        Command::Workers(cmd) => commands::run_workers_command(&store, cmd).await,
    }
}
