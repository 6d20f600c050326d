use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// TraceSweep: find and remove what software leaves behind, with
/// write-ahead backups and restore
#[derive(Parser, Debug)]
#[command(
    name = "tracesweep",
    version,
    about = "Sweep leftover software traces safely, with backups and restore",
    long_about = "TraceSweep discovers leftover files, services, scheduled tasks, kernel\n\
                   module configs, network profiles, preferences and startup items, and\n\
                   removes them with a write-ahead backup you can restore from.",
    after_help = "EXAMPLES:\n  \
        tracesweep scan --pattern acme              List everything mentioning 'acme'\n  \
        tracesweep app \"Acme Studio\" --dry-run      Preview an application sweep\n  \
        tracesweep app \"Acme Studio\" -y             Sweep an application\n  \
        tracesweep kind services --pattern acme     Sweep one resource kind\n  \
        tracesweep run --pattern acme --sequential  Full sweep, one kind at a time\n  \
        tracesweep sessions list                    Show backup sessions\n  \
        tracesweep restore --last                   Undo the most recent sweep\n  \
        tracesweep drivers                          Show registered drivers"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Report what would be removed without touching anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Also remove items classified as protected system resources
    #[arg(long, global = true)]
    pub force: bool,

    /// Disable services, timers and startup items instead of deleting them
    #[arg(long, global = true)]
    pub disable: bool,

    /// Skip the write-ahead backup (removals cannot be restored)
    #[arg(long, global = true)]
    pub no_backup: bool,

    /// Override the backup directory
    #[arg(long, global = true, value_name = "DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Use this config file instead of ~/.tracesweep/config.toml
    #[arg(long, global = true, value_name = "FILE", env = "TRACESWEEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Quiet mode, minimal output
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sweep every resource kind
    Run {
        /// Only remove items matching this pattern (case-insensitive)
        #[arg(long, short)]
        pattern: Option<String>,

        /// Run resource kinds concurrently
        #[arg(long, conflicts_with = "sequential")]
        parallel: bool,

        /// Run resource kinds one at a time
        #[arg(long)]
        sequential: bool,
    },

    /// Sweep a single resource kind
    Kind {
        /// Driver name (see `tracesweep drivers`)
        kind: String,

        /// Only remove items matching this pattern (case-insensitive)
        #[arg(long, short)]
        pattern: Option<String>,
    },

    /// Remove every trace of an application by name
    App {
        /// Application name
        name: String,
    },

    /// Discover items without removing anything
    Scan {
        /// Only list items matching this pattern (case-insensitive)
        #[arg(long, short)]
        pattern: Option<String>,

        /// Show every discovered item
        #[arg(long)]
        detailed: bool,
    },

    /// Restore items from a backup session
    Restore {
        /// Session ID to restore
        session: Option<String>,

        /// Restore the most recent session
        #[arg(long, conflicts_with = "session")]
        last: bool,

        /// Only restore entries of this resource kind
        #[arg(long)]
        kind: Option<String>,
    },

    /// Manage backup sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List registered drivers
    Drivers,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionsAction {
    /// List backup sessions, newest first
    List,

    /// Show the entries of one session
    Show {
        /// Session ID
        session: String,
    },

    /// Permanently delete a backup session
    Delete {
        /// Session ID
        session: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Initialize TraceSweep directories and default config
    Init,

    /// Print the config file path
    Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
