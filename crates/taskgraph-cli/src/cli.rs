//! Argument parsing for `taskgraphctl`.
//! Each subcommand maps 1:1 onto a `QueueStore` Control Surface or Query
//! call; this module only shapes arguments, `commands.rs` does the work.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "taskgraphctl", about = "Administrative CLI for taskgraph")]
pub struct Cli {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(subcommand)]
    Queue(QueueCommand),
    #[command(subcommand)]
    Workers(WorkersCommand),
}

#[derive(Subcommand)]
pub enum QueueCommand {
    /// Queue depth by status, oldest queued age, per-kind depth.
    Stats,
    /// Every task currently leased by a worker, for graceful shutdown.
    Drain { worker_id: String },
    /// Force a failed task back to queued, ignoring its terminal state.
    Retry { task_id: i64 },
    /// Cancel a single task or an entire pipeline.
    Cancel {
        /// A task id (integer) or a pipeline id (UUID).
        target: String,
    },
    /// Full task view for every task in a pipeline.
    Inspect { pipeline_id: uuid::Uuid },
}

#[derive(Subcommand)]
pub enum WorkersCommand {
    /// Every registered worker and its status.
    List,
    /// Mark a worker dead; its leases are left for the Recovery Service.
    Kill { worker_id: String },
}
