//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::daemon::DaemonSignal;

/// Daemon management commands.
#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground
    Start,

    /// Stop the running daemon
    Stop {
        /// Kill immediately instead of asking for a graceful shutdown
        #[arg(short, long)]
        force: bool,
    },

    /// Ask the running daemon to perform an action
    Signal {
        /// The action to request
        #[arg(value_enum)]
        action: SignalArg,
    },
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// History command arguments.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Number of entries to show (1-100)
    #[arg(short, long, default_value = "10")]
    pub limit: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Get command arguments.
#[derive(Debug, Args)]
pub struct GetCommand {
    /// Entry identifier
    pub id: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Search command arguments.
#[derive(Debug, Args)]
pub struct SearchCommand {
    /// Text to look for (case-insensitive substring)
    pub query: String,

    /// Maximum number of results
    #[arg(short, long, default_value = "100")]
    pub limit: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Delete command arguments.
#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Entry identifier
    pub id: String,
}

/// Clear command arguments.
#[derive(Debug, Args)]
pub struct ClearCommand {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Actions that can be requested from a running daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SignalArg {
    /// Log the effective settings (SIGHUP)
    Reload,
    /// Run a retention sweep now (SIGUSR1)
    Retention,
    /// Log uptime and pid (SIGUSR2)
    Stats,
}

impl From<SignalArg> for DaemonSignal {
    fn from(arg: SignalArg) -> Self {
        match arg {
            SignalArg::Reload => Self::Reload,
            SignalArg::Retention => Self::Retention,
            SignalArg::Stats => Self::Stats,
        }
    }
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// JSON output
    Json,
}
