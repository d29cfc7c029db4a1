//! `clipd` - CLI and daemon entry point
//!
//! This binary runs the clipboard daemon in the foreground and provides the
//! commands for controlling it and reading the stored history.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use nix::sys::signal::Signal;
use tokio_util::sync::CancellationToken;

use clipd::cli::{Cli, Command, ConfigCommand, DaemonCommand, OutputFormat};
use clipd::daemon::DaemonSignal;
use clipd::error::EXIT_FAILURE;
use clipd::{
    init_logging, ApiServer, ClipboardMonitor, Classifier, Config, Daemon, Entry, Error,
    IngestionService, InstanceGuard, SqliteStorage,
};

/// Width of the one-line preview in plain listings.
const PREVIEW_WIDTH: usize = 72;

/// How often `daemon stop` checks whether the daemon has exited.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Map the first domain error in the chain to its exit status.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map_or(EXIT_FAILURE, Error::exit_code)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load_from(cli.config.clone()).context("Failed to load configuration")?;

    init_logging(cli.verbosity(), config.logging.format);

    match cli.command {
        Command::Daemon(cmd) => handle_daemon(&config, cmd).await,
        Command::Status(cmd) => handle_status(&config, cmd.json).await,
        Command::History(cmd) => {
            let service = open_service(&config)?;
            let entries = service
                .get_history(cmd.limit, &CancellationToken::new())
                .await?;
            print_entries(&entries, cmd.format)
        }
        Command::Get(cmd) => {
            let service = open_service(&config)?;
            let entry = service.get_entry(&cmd.id, &CancellationToken::new()).await?;
            match cmd.format {
                OutputFormat::Plain => println!("{}", entry.content),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entry)?),
            }
            Ok(())
        }
        Command::Search(cmd) => {
            let service = open_service(&config)?;
            let entries = service
                .search(&cmd.query, cmd.limit, &CancellationToken::new())
                .await?;
            print_entries(&entries, cmd.format)
        }
        Command::Delete(cmd) => {
            let service = open_service(&config)?;
            service
                .delete_entry(&cmd.id, &CancellationToken::new())
                .await?;
            println!("Deleted entry {}", cmd.id);
            Ok(())
        }
        Command::Clear(cmd) => {
            if !cmd.yes {
                println!("This will delete every entry in the history.");
                println!("Use --yes to confirm.");
                return Ok(());
            }
            let service = open_service(&config)?;
            service.clear_history(&CancellationToken::new()).await?;
            println!("History cleared.");
            Ok(())
        }
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn open_service(config: &Config) -> anyhow::Result<IngestionService> {
    let path = config.database_path();
    build_service(config)
        .with_context(|| format!("Failed to open history database at {}", path.display()))
}

fn build_service(config: &Config) -> clipd::Result<IngestionService> {
    let storage = SqliteStorage::open(config.database_path())?;
    Ok(IngestionService::new(
        Arc::new(storage),
        Arc::new(Classifier::new()),
    ))
}

async fn handle_daemon(config: &Config, cmd: DaemonCommand) -> anyhow::Result<()> {
    let guard = InstanceGuard::new(config.pid_file_path());

    match cmd {
        DaemonCommand::Start => {
            // Storage is opened only once this process holds the guard.
            Daemon::launch(guard, |guard| {
                let service = build_service(config)?;
                let server = Arc::new(ApiServer::new(
                    config.socket_path(),
                    service.clone(),
                    config.request_timeout(),
                ));
                Ok(Daemon::new(
                    service,
                    Box::new(ClipboardMonitor::new()),
                    server,
                    guard,
                    config.daemon_settings(),
                ))
            })
            .await?;
        }
        DaemonCommand::Stop { force } => {
            let signal = if force {
                Signal::SIGKILL
            } else {
                Signal::SIGTERM
            };
            let pid = guard.notify(signal)?;
            println!("Sent {signal} to daemon (pid {pid})");

            // Allow the daemon its own shutdown grace period, plus a margin.
            let deadline = config.shutdown_timeout() + Duration::from_secs(5);
            if wait_for_exit(&guard, deadline).await? {
                if force {
                    guard.release()?;
                }
                println!("Daemon stopped.");
            } else {
                println!("Daemon is still running after {}s.", deadline.as_secs());
            }
        }
        DaemonCommand::Signal { action } => {
            let signal = DaemonSignal::from(action);
            let pid = guard.notify(signal.as_nix())?;
            println!("Sent {signal} to daemon (pid {pid})");
        }
    }

    Ok(())
}

async fn wait_for_exit(guard: &InstanceGuard, deadline: Duration) -> clipd::Result<bool> {
    match tokio::time::timeout(deadline, until_stopped(guard)).await {
        Ok(result) => result.map(|()| true),
        Err(_) => Ok(false),
    }
}

async fn until_stopped(guard: &InstanceGuard) -> clipd::Result<()> {
    while guard.probe()?.alive {
        tokio::time::sleep(STOP_POLL_INTERVAL).await;
    }
    Ok(())
}

async fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let probe = InstanceGuard::new(config.pid_file_path()).probe()?;
    let stats = open_service(config)?
        .get_stats(&CancellationToken::new())
        .await?;

    if json {
        let status = serde_json::json!({
            "daemon_running": probe.alive,
            "pid": probe.alive.then_some(probe.pid),
            "database_path": config.database_path(),
            "socket_path": config.socket_path(),
            "total_entries": stats.total_entries,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("clipd status");
        println!("------------");
        if probe.alive {
            println!("Daemon:        Running (pid {})", probe.pid);
        } else {
            println!("Daemon:        Not running");
        }
        println!("Database:      {}", config.database_path().display());
        println!("Socket:        {}", config.socket_path().display());
        println!("Entries:       {}", stats.total_entries);
    }
    Ok(())
}

fn print_entries(entries: &[Entry], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(entries)?),
        OutputFormat::Plain => {
            if entries.is_empty() {
                println!("No entries.");
            }
            for entry in entries {
                println!(
                    "[{}] {}  {}",
                    entry.id,
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    preview(&entry.content)
                );
            }
        }
    }
    Ok(())
}

/// First line of `content`, cut to [`PREVIEW_WIDTH`] characters.
fn preview(content: &str) -> String {
    let first = content.lines().next().unwrap_or_default();
    let mut out: String = first.chars().take(PREVIEW_WIDTH).collect();
    if out.len() < first.len() || content.lines().nth(1).is_some() {
        out.push_str("...");
    }
    out
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[API]");
                println!("  Socket path:        {}", config.socket_path().display());
                println!(
                    "  Request timeout:    {}s",
                    config.api.request_timeout_secs
                );
                println!();
                println!("[Daemon]");
                println!("  Poll interval:      {}ms", config.daemon.poll_interval_ms);
                println!(
                    "  Shutdown timeout:   {}s",
                    config.daemon.shutdown_timeout_secs
                );
                println!("  PID file:           {}", config.pid_file_path().display());
                println!();
                println!("[Retention]");
                println!("  Enabled:            {}", config.retention.enabled);
                println!("  Max age (days):     {}", config.retention.max_age_days);
                println!("  Interval (hours):   {}", config.retention.interval_hours);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            Config::load_from(Some(path))?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}
