//! Logging configuration for clipd.
//!
//! Every component logs through the `tracing` facade. Installing a subscriber
//! is the only process-wide step; without one, events are discarded, which is
//! what unit tests rely on.

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Suppress all output except errors.
    Quiet,
    /// Normal output level (info and above).
    #[default]
    Normal,
    /// Verbose output (debug and above).
    Verbose,
    /// Very verbose output (trace level).
    Trace,
}

impl Verbosity {
    /// Convert verbosity to tracing level filter.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Initialize the logging system.
///
/// This should be called once at application startup. `RUST_LOG` takes
/// precedence over `verbosity`. Calling it again is harmless.
///
/// # Examples
///
/// ```no_run
/// use clipd::logging::{init_logging, LogFormat, Verbosity};
///
/// init_logging(Verbosity::Verbose, LogFormat::Text);
/// ```
pub fn init_logging(verbosity: Verbosity, format: LogFormat) {
    let default_filter = format!("clipd={}", verbosity.to_level_filter());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Install the subscriber (ignore error if already set)
    let _ = match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
    };
}

/// Initialize logging for tests.
///
/// Only warnings and errors are shown to keep test output clean.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_to_level() {
        assert_eq!(Verbosity::Quiet.to_level_filter(), Level::ERROR);
        assert_eq!(Verbosity::Normal.to_level_filter(), Level::INFO);
        assert_eq!(Verbosity::Verbose.to_level_filter(), Level::DEBUG);
        assert_eq!(Verbosity::Trace.to_level_filter(), Level::TRACE);
    }

    #[test]
    fn test_verbosity_default() {
        assert_eq!(Verbosity::default(), Verbosity::Normal);
    }

    #[test]
    fn test_log_format_default() {
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }

    #[test]
    fn test_log_format_deserialize() {
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, LogFormat::Json);
        let format: LogFormat = serde_json::from_str("\"text\"").unwrap();
        assert_eq!(format, LogFormat::Text);
    }

    #[test]
    fn test_init_logging_is_repeatable() {
        // Only the first call installs a subscriber; later calls are ignored.
        init_logging(Verbosity::Normal, LogFormat::Text);
        init_logging(Verbosity::Trace, LogFormat::Json);
    }

    #[test]
    fn test_init_test_logging_does_not_panic() {
        init_test_logging();
    }
}
