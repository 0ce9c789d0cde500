//! The CLI surface (`queue:work`, `queue:clear`, `queue:flush`,
//! `queue:forget`, `queue:retry`, `queue:restore`), plus `serve-admin` for
//! the admin HTTP surface, as one binary's `clap`-derived subcommands, the
//! same derive style `clawd` and `nucleus-cli` use.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "queue-cli")]
#[command(version, about = "Durable FIFO job queue: worker pool and admin commands", long_about = None)]
pub struct Cli {
    /// Path to a TOML config file. Falls back to built-in defaults / env
    /// vars when omitted.
    #[arg(long, env = "QUEUE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Deployment-wide fast-store key prefix.
    #[arg(long, env = "QUEUE_APP_PREFIX", global = true)]
    pub app_prefix: Option<String>,

    #[arg(long, env = "QUEUE_POSTGRES_URL", global = true)]
    pub postgres_url: Option<String>,

    #[arg(long, env = "QUEUE_REDIS_URL", global = true)]
    pub redis_url: Option<String>,

    /// Log level filter (e.g. "info", "debug", "queue_core=trace").
    #[arg(long, env = "QUEUE_LOG", global = true)]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start N workers for a queue; blocks until SIGINT/SIGTERM.
    #[command(name = "queue:work")]
    Work {
        #[arg(short, long, default_value = "default")]
        queue: String,
        #[arg(short, long, default_value_t = 1)]
        worker: usize,
    },
    /// Delete the pending list of one queue, or every queue.
    #[command(name = "queue:clear")]
    Clear {
        #[arg(short, long, default_value = "default")]
        queue: String,
        #[arg(short, long)]
        all: bool,
    },
    /// Delete the failed list of one queue, or every queue.
    #[command(name = "queue:flush")]
    Flush {
        #[arg(short, long, default_value = "default")]
        queue: String,
        #[arg(short, long)]
        all: bool,
    },
    /// Search every queue's pending list and remove the first job matching
    /// `id`.
    #[command(name = "queue:forget")]
    Forget {
        #[arg(short, long)]
        id: Uuid,
    },
    /// Retry one failed job by id, or every failed job on a queue.
    #[command(name = "queue:retry")]
    Retry {
        #[arg(short, long, default_value = "default")]
        queue: String,
        #[arg(short, long)]
        id: Option<Uuid>,
    },
    /// Crash-recovery pass: re-enqueue durable-but-orphaned records.
    #[command(name = "queue:restore")]
    Restore {
        #[arg(short, long, default_value = "default")]
        queue: String,
    },
    /// Serve the read-only admin HTTP surface (`/healthz`, `/v1/queues`).
    #[command(name = "serve-admin")]
    ServeAdmin {
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}
