//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// rsshub - background RSS poller
#[derive(Parser, Debug)]
#[command(
    name = "rsshub",
    about = "Periodic RSS fetcher with a live-resizable worker pool",
    version,
    after_help = "Environment: CLI_APP_TIMER_INTERVAL and CLI_APP_WORKERS_COUNT override the defaults seeded into a new store"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a feed
    Add {
        /// Unique feed name
        #[arg(long)]
        name: String,

        /// Feed URL
        #[arg(long)]
        url: String,
    },

    /// Change the poll interval (e.g. 45s, 3m, 1h30m; a bare number is seconds)
    SetInterval {
        #[arg(value_name = "DURATION")]
        interval: String,
    },

    /// Change the number of fetch workers (1-10)
    SetWorkers {
        #[arg(value_name = "COUNT")]
        count: usize,
    },

    /// List registered feeds, newest first
    List {
        /// Number of feeds to show
        #[arg(short, long, default_value = "5")]
        num: usize,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete a feed and its articles
    Delete {
        /// Feed name
        #[arg(long)]
        name: String,
    },

    /// Show stored articles, newest first
    Articles {
        /// Only articles of this feed
        #[arg(short, long)]
        feed: Option<String>,

        /// Number of articles to show
        #[arg(short, long, default_value = "5")]
        num: usize,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run the background fetcher until interrupted
    Fetch,
}

/// Output format for listing commands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => Err(format!("Unknown format: {}. Use: text, json, or table", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::Table => write!(f, "table"),
        }
    }
}
