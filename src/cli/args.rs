use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

use crate::features::sync::{OperationKind, ResourceType};

#[derive(Parser)]
#[command(name = "campus-market")]
#[command(about = "Offline mutation queue for Campus Market")]
#[command(long_about = "campus-market - Offline mutation queue for Campus Market

Records listing, accommodation, booking and message writes made while the
backend is unreachable, and replays them in order once it comes back.

QUICK START:
  campus-market sync add listing create -p '{\"title\":\"Desk\"}'
  campus-market sync status          Show how much is waiting
  campus-market sync run             Replay queued mutations now
  campus-market sync watch           Replay on reconnect and every minute

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting

CONFIGURATION:
  ~/.campus-market/config.yaml, plus CAMPUS_MARKET_BACKEND_URL and
  CAMPUS_MARKET_API_KEY from the environment.")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Defaults to `general.default_output` from the config file.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Write logs to stderr as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Offline mutation queue
    ///
    /// # Subcommands
    ///
    ///   status   Show how many mutations are waiting
    ///   list     Show queued mutations in replay order
    ///   add      Queue a mutation
    ///   run      Replay queued mutations once
    ///   discard  Drop one queued mutation
    ///   clear    Drop every queued mutation
    ///   watch    Replay on reconnect and on a timer until interrupted
    Sync(SyncArgs),

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct SyncArgs {
    #[command(subcommand)]
    pub command: SyncCommands,
}

/// Sync queue subcommands.
#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show queue status
    Status,

    /// List queued mutations in replay order
    List {
        /// Maximum entries to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Queue a mutation for later replay
    Add {
        /// Collection the mutation targets
        #[arg(value_enum)]
        resource: ResourceType,

        /// What the mutation does
        #[arg(value_enum)]
        operation: OperationKind,

        /// Id of the existing record (update and delete)
        #[arg(long)]
        id: Option<String>,

        /// JSON payload (create and update)
        #[arg(long, short = 'p')]
        payload: Option<String>,
    },

    /// Replay queued mutations once
    ///
    /// Probes the backend first; when it is unreachable nothing is sent.
    Run {
        /// Show the requests that would be sent without sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Drop the queued mutation at INDEX (see `sync list`)
    Discard {
        /// Position in the queue, starting at 0
        index: usize,
    },

    /// Drop every queued mutation
    Clear {
        /// Required; queued writes are lost
        #[arg(long)]
        force: bool,
    },

    /// Keep replaying: on reconnect and every drain interval
    Watch,
}
