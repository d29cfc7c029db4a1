//! Command-line interface for clipd.
//!
//! This module provides the CLI structure for the `clipd` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ClearCommand, ConfigCommand, DaemonCommand, DeleteCommand, GetCommand, HistoryCommand,
    OutputFormat, SearchCommand, SignalArg, StatusCommand,
};

/// clipd - Clipboard history with sensitive-content filtering
///
/// A background daemon that records clipboard text, skips anything that
/// looks like a credential, and serves the history over a local socket.
#[derive(Debug, Parser)]
#[command(name = "clipd")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the daemon
    #[command(subcommand)]
    Daemon(DaemonCommand),

    /// Show daemon and history status
    Status(StatusCommand),

    /// Show recent entries
    History(HistoryCommand),

    /// Show a single entry
    Get(GetCommand),

    /// Search entries
    Search(SearchCommand),

    /// Delete a single entry
    Delete(DeleteCommand),

    /// Delete every entry
    Clear(ClearCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
