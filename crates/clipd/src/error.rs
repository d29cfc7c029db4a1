//! Error types for clipd.
//!
//! This module defines every error surfaced by the daemon. Variants are grouped
//! by how callers are expected to react to them: validation faults and policy
//! rejections are decided locally and never retried, storage faults always
//! reach the caller, and lifecycle faults abort startup.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for clipd operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Validation Errors ===
    /// Captured content was empty.
    #[error("content cannot be empty")]
    EmptyContent,

    /// No captured value was supplied.
    #[error("entry cannot be nil")]
    NilEntry,

    /// An entry identifier was empty.
    #[error("invalid entry ID")]
    InvalidId,

    /// A history limit was outside the accepted range.
    #[error("limit must be between 1 and 100")]
    InvalidLimit,

    /// A search query was empty.
    #[error("search query cannot be empty")]
    EmptyQuery,

    // === Policy Errors ===
    /// Content was rejected because it looks like a credential.
    #[error("sensitive content: {reason}")]
    SensitiveContent {
        /// Name of the credential family that matched.
        reason: String,
    },

    // === Lookup Errors ===
    /// The requested entry does not exist.
    #[error("entry not found")]
    NotFound,

    // === Storage Errors ===
    /// The storage adapter failed while performing an operation.
    #[error("storage failure during {operation}: {source}")]
    StorageFailure {
        /// The service operation that was being performed.
        operation: &'static str,
        /// The underlying adapter error.
        #[source]
        source: Box<Error>,
    },

    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Lifecycle Errors ===
    /// Another daemon instance holds the instance marker.
    #[error("daemon already running with PID {pid}")]
    AlreadyRunning {
        /// Process identifier recorded in the marker.
        pid: i32,
    },

    /// The instance marker could not be read, written, or parsed.
    #[error("instance marker error at {path}: {source}")]
    PidFile {
        /// Path to the marker file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The request server could not bind its socket.
    #[error("failed to bind socket at {path}: {source}")]
    SocketBind {
        /// Path to the socket file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// No daemon is running.
    #[error("daemon is not running")]
    DaemonNotRunning,

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Runtime Errors ===
    /// The clipboard monitor failed to read the clipboard.
    #[error("monitor error: {0}")]
    Monitor(String),

    /// The request server failed while serving.
    #[error("request server error: {0}")]
    Server(String),

    /// Sending a signal to the daemon process failed.
    #[error("failed to signal process {pid}: {source}")]
    Signal {
        /// Target process identifier.
        pid: i32,
        /// The underlying errno.
        #[source]
        source: nix::errno::Errno,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// The operation observed cancellation and stopped.
    #[error("operation cancelled")]
    Cancelled,

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for clipd operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Exit status for startup and lifecycle faults.
pub const EXIT_LIFECYCLE: u8 = 2;

/// Exit status for any other failure.
pub const EXIT_FAILURE: u8 = 1;

/// Exit status reported when a client command finds no daemon.
pub const EXIT_NOT_RUNNING: u8 = 3;

/// Exit status for a history database that cannot be opened or prepared.
pub const EXIT_STARTUP: u8 = 4;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a sensitive content rejection.
    #[must_use]
    pub fn sensitive(reason: impl Into<String>) -> Self {
        Self::SensitiveContent {
            reason: reason.into(),
        }
    }

    /// Wrap an adapter error as a storage failure for the given operation.
    ///
    /// Cancellation passes through unchanged so callers can still tell a
    /// cooperative stop apart from a real fault.
    #[must_use]
    pub fn storage(operation: &'static str, source: Error) -> Self {
        if source.is_cancelled() {
            return source;
        }
        Self::StorageFailure {
            operation,
            source: Box::new(source),
        }
    }

    /// Create a new monitor error.
    #[must_use]
    pub fn monitor(message: impl Into<String>) -> Self {
        Self::Monitor(message.into())
    }

    /// Create a new request server error.
    #[must_use]
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is a caller-input fault.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyContent
                | Self::NilEntry
                | Self::InvalidId
                | Self::InvalidLimit
                | Self::EmptyQuery
        )
    }

    /// Check if this error is a policy rejection of sensitive content.
    #[must_use]
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, Self::SensitiveContent { .. })
    }

    /// Check if this error means the entry does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Check if this error is a cooperative cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error is fatal to daemon startup.
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning { .. } | Self::PidFile { .. } | Self::SocketBind { .. }
        )
    }

    /// Check if this error means storage could not be brought up.
    #[must_use]
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::DatabaseOpen { .. } | Self::DatabaseMigration { .. } | Self::DirectoryCreate { .. }
        )
    }

    /// Check if this error indicates the daemon is not running.
    #[must_use]
    pub fn is_daemon_not_running(&self) -> bool {
        matches!(self, Self::DaemonNotRunning)
    }

    /// The process exit status that best describes this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.is_lifecycle() {
            EXIT_LIFECYCLE
        } else if self.is_startup() {
            EXIT_STARTUP
        } else if self.is_daemon_not_running() {
            EXIT_NOT_RUNNING
        } else {
            EXIT_FAILURE
        }
    }
}
