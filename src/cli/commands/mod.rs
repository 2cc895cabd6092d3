//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod jobs;
mod monitor;
mod queue;
mod serve;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "phantomq")]
#[command(about = "Sequential admission queue for PhantomBuster profile extraction")]
#[command(version)]
pub struct Cli {
    /// Path to the SQLite database (overrides PHANTOMQ_DATABASE)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Redis URL backing the lock and waiting list (overrides REDIS_URL)
    #[arg(long, global = true)]
    redis_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook/API server with the monitor and poll workers
    Serve {
        /// Address to bind to: PORT or HOST:PORT (default: PHANTOMQ_BIND or 127.0.0.1:8420)
        bind: Option<String>,
    },

    /// Show queue and audit log status
    Status {
        /// Continuously refresh status display
        #[arg(long)]
        live: bool,

        /// Refresh interval in seconds
        #[arg(long, default_value = "5")]
        interval: u64,
    },

    /// Request an extraction slot for a target
    Enqueue {
        /// Target entity (company/person) to extract profiles for
        target_id: String,
        /// Unit-of-work kind (defaults to profile extraction)
        #[arg(short, long)]
        kind: Option<String>,
        /// Search URL handed to the phantom
        #[arg(short, long)]
        search_url: Option<String>,
    },

    /// Release the current slot and start the next waiting job
    Advance,

    /// Run the stuck-job sweep
    Monitor {
        /// Run a single sweep and exit
        #[arg(long)]
        once: bool,
    },

    /// Waiting-list and lock management
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },

    /// List extraction audit records
    Jobs {
        /// Filter by status (pending, success, failed)
        #[arg(short, long)]
        status: Option<String>,
        /// Limit number of records
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// List waiting jobs in order
    List,
    /// Remove a waiting job by id
    Remove {
        /// Queue-assigned job id (see `queue list`)
        job_id: String,
    },
    /// Remove every waiting job
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        confirm: bool,
    },
    /// Drop the extraction lock without promoting the next job
    ReleaseLock {
        /// Skip confirmation prompt
        #[arg(long)]
        confirm: bool,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if let Some(database) = cli.database {
        settings.database_path = database;
    }
    if let Some(redis_url) = cli.redis_url {
        settings.redis_url = redis_url;
    }

    match cli.command {
        Commands::Serve { bind } => serve::cmd_serve(&settings, bind.as_deref()).await,
        Commands::Status { live, interval } => status::cmd_status(&settings, live, interval).await,
        Commands::Enqueue {
            target_id,
            kind,
            search_url,
        } => {
            queue::cmd_enqueue(&settings, &target_id, kind.as_deref(), search_url.as_deref()).await
        }
        Commands::Advance => queue::cmd_advance(&settings).await,
        Commands::Monitor { once } => monitor::cmd_monitor(&settings, once).await,
        Commands::Queue { command } => match command {
            QueueCommands::List => queue::cmd_queue_list(&settings).await,
            QueueCommands::Remove { job_id } => queue::cmd_queue_remove(&settings, &job_id).await,
            QueueCommands::Clear { confirm } => queue::cmd_queue_clear(&settings, confirm).await,
            QueueCommands::ReleaseLock { confirm } => {
                queue::cmd_release_lock(&settings, confirm).await
            }
        },
        Commands::Jobs { status, limit } => {
            jobs::cmd_jobs(&settings, status.as_deref(), limit).await
        }
    }
}
