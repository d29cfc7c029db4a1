//! OS signal routing.
//!
//! | Signal            | Action                                   | Result     |
//! |-------------------|------------------------------------------|------------|
//! | `SIGINT`/`SIGTERM`| request shutdown                         | `Stop`     |
//! | `SIGHUP`          | log effective settings (no live reload)  | `Continue` |
//! | `SIGUSR1`         | run a retention sweep now                | `Continue` |
//! | `SIGUSR2`         | log uptime and pid                       | `Continue` |

use std::time::Instant;

use chrono::Utc;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument, Span};

use super::retention_cutoff;
use crate::config::DaemonSettings;
use crate::error::{Error, Result};
use crate::service::IngestionService;

/// Signals the daemon reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// `SIGINT`.
    Interrupt,
    /// `SIGTERM`.
    Terminate,
    /// `SIGHUP`.
    Reload,
    /// `SIGUSR1`.
    Retention,
    /// `SIGUSR2`.
    Stats,
}

impl DaemonSignal {
    /// Conventional signal name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Reload => "SIGHUP",
            Self::Retention => "SIGUSR1",
            Self::Stats => "SIGUSR2",
        }
    }

    /// The OS signal, for senders.
    #[must_use]
    pub fn as_nix(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal;
        match self {
            Self::Interrupt => Signal::SIGINT,
            Self::Terminate => Signal::SIGTERM,
            Self::Reload => Signal::SIGHUP,
            Self::Retention => Signal::SIGUSR1,
            Self::Stats => Signal::SIGUSR2,
        }
    }

    /// Whether delivery of this signal ends the daemon.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Interrupt | Self::Terminate)
    }
}

impl std::fmt::Display for DaemonSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What the listener should do after a signal has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Keep listening.
    Continue,
    /// Stop listening and shut the daemon down.
    Stop,
}

#[derive(Debug)]
struct Streams {
    interrupt: Signal,
    terminate: Signal,
    hangup: Signal,
    user1: Signal,
    user2: Signal,
}

impl Streams {
    fn register() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
            user1: signal(SignalKind::user_defined1())?,
            user2: signal(SignalKind::user_defined2())?,
        })
    }

    async fn recv(&mut self) -> Option<DaemonSignal> {
        tokio::select! {
            s = self.interrupt.recv() => s.map(|()| DaemonSignal::Interrupt),
            s = self.terminate.recv() => s.map(|()| DaemonSignal::Terminate),
            s = self.hangup.recv() => s.map(|()| DaemonSignal::Reload),
            s = self.user1.recv() => s.map(|()| DaemonSignal::Retention),
            s = self.user2.recv() => s.map(|()| DaemonSignal::Stats),
        }
    }
}

/// Maps delivered signals to daemon actions.
#[derive(Debug)]
pub struct SignalRouter {
    service: IngestionService,
    settings: DaemonSettings,
    started_at: Instant,
    span: Span,
    streams: Option<Streams>,
}

impl SignalRouter {
    /// Create a router that is not yet listening.
    #[must_use]
    pub fn new(
        service: IngestionService,
        settings: DaemonSettings,
        started_at: Instant,
        span: Span,
    ) -> Self {
        Self {
            service,
            settings,
            started_at,
            span,
            streams: None,
        }
    }

    /// Register interest in the daemon's signals.
    ///
    /// # Errors
    ///
    /// Returns an error if a signal handler cannot be installed.
    pub fn install(&mut self) -> Result<()> {
        if self.streams.is_none() {
            self.streams = Some(Streams::register().map_err(Error::Io)?);
        }
        Ok(())
    }

    /// Whether the router currently holds signal registrations.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.streams.is_some()
    }

    /// Drop the signal registrations. Later calls do nothing.
    pub fn stop(&mut self) {
        if self.streams.take().is_some() {
            self.span.in_scope(|| info!("Signal router stopped"));
        }
    }

    /// Listen until a fatal signal arrives or `cancel` fires.
    ///
    /// A fatal signal cancels `cancel`. The router is stopped on return.
    pub async fn listen(&mut self, cancel: CancellationToken) {
        loop {
            let Some(streams) = self.streams.as_mut() else {
                break;
            };

            let delivered = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                s = streams.recv() => s,
            };

            let Some(sig) = delivered else {
                break;
            };

            if self.handle(sig, &cancel).await == SignalAction::Stop {
                cancel.cancel();
                break;
            }
        }

        self.stop();
    }

    /// Carry out the action for one signal.
    pub async fn handle(&self, sig: DaemonSignal, cancel: &CancellationToken) -> SignalAction {
        self.dispatch(sig, cancel)
            .instrument(self.span.clone())
            .await
    }

    async fn dispatch(&self, sig: DaemonSignal, cancel: &CancellationToken) -> SignalAction {
        match sig {
            DaemonSignal::Interrupt | DaemonSignal::Terminate => {
                info!(signal = %sig, "Received shutdown signal");
                SignalAction::Stop
            }
            DaemonSignal::Reload => {
                info!(signal = %sig, "Received reload signal");
                self.log_settings();
                SignalAction::Continue
            }
            DaemonSignal::Retention => {
                info!(signal = %sig, "Received manual retention trigger");
                self.run_retention(cancel).await;
                SignalAction::Continue
            }
            DaemonSignal::Stats => {
                info!(signal = %sig, "Received stats dump request");
                self.log_stats();
                SignalAction::Continue
            }
        }
    }

    fn log_settings(&self) {
        let s = &self.settings;
        info!(
            poll_interval_ms = u64::try_from(s.poll_interval.as_millis()).unwrap_or(u64::MAX),
            retention_enabled = s.retention_enabled,
            retention_max_age_secs = s.retention_max_age.as_secs(),
            retention_interval_secs = s.retention_interval.as_secs(),
            "Current configuration"
        );
        info!("Full configuration reload requires a daemon restart");
    }

    async fn run_retention(&self, cancel: &CancellationToken) {
        let cutoff = retention_cutoff(Utc::now(), self.settings.retention_max_age);
        match self.service.delete_older_than(cutoff, cancel).await {
            Ok(deleted) => info!(deleted_entries = deleted, "Manual retention completed"),
            Err(e) => error!(error = %e, "Manual retention failed"),
        }
    }

    fn log_stats(&self) {
        info!(
            uptime_secs = self.started_at.elapsed().as_secs(),
            pid = std::process::id(),
            "Daemon statistics"
        );
    }
}
