//! `clipd` - Clipboard history daemon with sensitive-content filtering
//!
//! This library provides the daemon that watches the system clipboard, the
//! ingestion gate that keeps credentials out of the history, the SQLite store,
//! and the local request server that exposes it.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod analyzer;
pub mod api;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod entry;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod service;
pub mod storage;

pub use analyzer::{Analyzer, Classifier};
pub use api::{ApiServer, RequestServer};
pub use config::Config;
pub use daemon::{Daemon, DaemonState, InstanceGuard};
pub use entry::{CapturedValue, Classification, ContentType, Entry};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use monitor::{ClipboardMonitor, Monitor};
pub use service::{IngestionService, Stats};
pub use storage::{SqliteStorage, Storage};
