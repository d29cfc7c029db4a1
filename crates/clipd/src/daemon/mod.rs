//! Daemon orchestration.
//!
//! The [`Daemon`] owns the long-running work of clipd:
//!
//! - a polling loop that feeds clipboard changes to the ingestion service
//! - a retention loop that sweeps old entries
//! - the request server
//! - a shutdown waiter that stops the request server within a deadline
//!
//! All four run in one supervised [`TaskGroup`]. Per-tick failures inside the
//! loops are logged and never end the daemon; only a task that exits with a
//! real error brings everything down.

pub mod guard;
pub mod signals;
pub mod supervisor;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::api::RequestServer;
use crate::config::DaemonSettings;
use crate::error::{Error, Result};
use crate::monitor::Monitor;
use crate::service::IngestionService;

pub use guard::{InstanceGuard, Probe};
pub use signals::{DaemonSignal, SignalAction, SignalRouter};
pub use supervisor::TaskGroup;

/// Lifecycle of a daemon. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DaemonState {
    /// Constructed, loops not yet launched.
    Initializing,
    /// Loops launched.
    Running,
    /// Cancellation observed; stopping.
    ShuttingDown,
    /// Everything has stopped.
    Stopped,
}

impl std::fmt::Display for DaemonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting down"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// `now - max_age`, saturating at the earliest representable time.
#[must_use]
pub fn retention_cutoff(now: DateTime<Utc>, max_age: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(max_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// The clipboard daemon.
#[derive(Debug)]
pub struct Daemon {
    service: IngestionService,
    monitor: Box<dyn Monitor>,
    server: Arc<dyn RequestServer>,
    guard: InstanceGuard,
    settings: DaemonSettings,
    started_at: Instant,
    state: Arc<watch::Sender<DaemonState>>,
    span: Span,
}

impl Daemon {
    /// Assemble a daemon from its collaborators.
    #[must_use]
    pub fn new(
        service: IngestionService,
        monitor: Box<dyn Monitor>,
        server: Arc<dyn RequestServer>,
        guard: InstanceGuard,
        settings: DaemonSettings,
    ) -> Self {
        let (state, _) = watch::channel(DaemonState::Initializing);
        Self {
            service,
            monitor,
            server,
            guard,
            settings,
            started_at: Instant::now(),
            state: Arc::new(state),
            span: info_span!("daemon"),
        }
    }

    /// Replace the span every daemon event is recorded under.
    ///
    /// `Span::none()` silences the daemon without touching the global
    /// subscriber.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Observe state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DaemonState> {
        self.state.subscribe()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DaemonState {
        *self.state.borrow()
    }

    /// Run the daemon as the process's single instance.
    ///
    /// Acquires the instance guard, listens for signals, runs until a fatal
    /// signal or a task failure, and releases the guard on the way out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] before anything starts if another
    /// instance holds the guard. Otherwise returns whatever [`run`](Self::run)
    /// returns.
    pub async fn start(self) -> Result<()> {
        self.guard.acquire()?;
        self.serve_acquired().await
    }

    /// Claim `guard`, then build the daemon with `assemble` and start it.
    ///
    /// Nothing `assemble` opens is touched unless the guard was free. If
    /// assembly fails the guard is released and the assembly error returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] without calling `assemble` if another
    /// instance holds the guard, the error from `assemble`, or whatever
    /// [`run`](Self::run) returns.
    pub async fn launch<F>(guard: InstanceGuard, assemble: F) -> Result<()>
    where
        F: FnOnce(InstanceGuard) -> Result<Self>,
    {
        guard.acquire()?;
        match assemble(guard.clone()) {
            Ok(daemon) => daemon.serve_acquired().await,
            Err(e) => {
                let span = info_span!("daemon");
                span.in_scope(|| error!(error = %e, "Daemon failed to start"));
                release_guard(&guard, &span);
                Err(e)
            }
        }
    }

    async fn serve_acquired(self) -> Result<()> {
        let guard = self.guard.clone();
        let span = self.span.clone();

        let mut router = SignalRouter::new(
            self.service.clone(),
            self.settings,
            self.started_at,
            span.clone(),
        );
        if let Err(e) = router.install() {
            release_guard(&guard, &span);
            return Err(e);
        }

        let root = CancellationToken::new();
        let listener = {
            let root = root.clone();
            tokio::spawn(async move { router.listen(root).await })
        };

        let result = self.run(root.clone()).await;

        root.cancel();
        if let Err(e) = listener.await {
            span.in_scope(|| warn!(error = %e, "Signal listener ended abnormally"));
        }

        release_guard(&guard, &span);
        result
    }

    /// Run the supervised tasks until `cancel` fires or one of them fails.
    ///
    /// # Errors
    ///
    /// Returns the first non-cancellation error from any task.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let Self {
            service,
            monitor,
            server,
            settings,
            state,
            span,
            ..
        } = self;

        let mut group = TaskGroup::new(&cancel);
        let token = group.token();

        group.spawn(
            "poll",
            poll_loop(service.clone(), monitor, settings.poll_interval, token.clone())
                .instrument(span.clone()),
        );
        group.spawn(
            "retention",
            retention_loop(service, settings, token.clone()).instrument(span.clone()),
        );
        {
            let server = Arc::clone(&server);
            let token = token.clone();
            group.spawn("server", async move { server.start(token).await });
        }
        {
            let state = Arc::clone(&state);
            let timeout = settings.shutdown_timeout;
            group.spawn(
                "shutdown",
                shutdown_waiter(server, state, timeout, token).instrument(span.clone()),
            );
        }

        advance(&state, DaemonState::Running);
        span.in_scope(|| {
            info!(
                pid = std::process::id(),
                poll_interval_ms =
                    u64::try_from(settings.poll_interval.as_millis()).unwrap_or(u64::MAX),
                retention_enabled = settings.retention_enabled,
                "Daemon running"
            );
        });

        let result = group.wait().await;

        advance(&state, DaemonState::ShuttingDown);
        advance(&state, DaemonState::Stopped);
        span.in_scope(|| match &result {
            Ok(()) => info!("Daemon stopped"),
            Err(e) => error!(error = %e, "Daemon stopped with error"),
        });

        result
    }
}

/// Move the published state forward; never backwards.
fn advance(state: &watch::Sender<DaemonState>, next: DaemonState) {
    state.send_if_modified(|current| {
        if next > *current {
            *current = next;
            true
        } else {
            false
        }
    });
}

fn release_guard(guard: &InstanceGuard, span: &Span) {
    if let Err(e) = guard.release() {
        span.in_scope(|| warn!(error = %e, "Failed to release instance marker"));
    }
}

async fn poll_loop(
    service: IngestionService,
    mut monitor: Box<dyn Monitor>,
    every: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        interval_ms = u64::try_from(every.as_millis()).unwrap_or(u64::MAX),
        "Clipboard polling started"
    );

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Clipboard access may block briefly; keep it off the async workers.
        let (returned, checked) = tokio::task::spawn_blocking(move || {
            let checked = monitor.check();
            (monitor, checked)
        })
        .await
        .map_err(|e| Error::internal(format!("monitor task failed: {e}")))?;
        monitor = returned;

        let value = match checked {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "Clipboard check failed");
                continue;
            }
        };

        match service.process_new_entry(Some(value), &cancel).await {
            Ok(entry) => debug!(id = %entry.id, "Stored clipboard entry"),
            Err(Error::SensitiveContent { reason }) => {
                debug!(reason = %reason, "Skipped sensitive content");
            }
            Err(e) if e.is_cancelled() => break,
            Err(e) => error!(error = %e, "Failed to process clipboard entry"),
        }
    }

    info!("Clipboard polling stopped");
    Ok(())
}

async fn retention_loop(
    service: IngestionService,
    settings: DaemonSettings,
    cancel: CancellationToken,
) -> Result<()> {
    if !settings.retention_enabled {
        info!("Retention disabled");
        cancel.cancelled().await;
        return Ok(());
    }

    // The first tick completes immediately, giving a sweep at startup.
    let mut ticker = interval(settings.retention_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        max_age_secs = settings.retention_max_age.as_secs(),
        interval_secs = settings.retention_interval.as_secs(),
        "Retention sweeps started"
    );

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let cutoff = retention_cutoff(Utc::now(), settings.retention_max_age);
        match service.delete_older_than(cutoff, &cancel).await {
            Ok(0) => debug!("Retention sweep found nothing to delete"),
            Ok(deleted) => info!(deleted_entries = deleted, "Retention sweep completed"),
            Err(e) if e.is_cancelled() => break,
            Err(e) => error!(error = %e, "Retention sweep failed"),
        }
    }

    info!("Retention sweeps stopped");
    Ok(())
}

async fn shutdown_waiter(
    server: Arc<dyn RequestServer>,
    state: Arc<watch::Sender<DaemonState>>,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    cancel.cancelled().await;
    advance(&state, DaemonState::ShuttingDown);
    info!(timeout_secs = timeout.as_secs(), "Shutting down request server");

    match server.shutdown(timeout).await {
        Ok(()) => {}
        Err(e @ Error::Timeout { .. }) => {
            warn!(error = %e, "Request server did not drain in time");
        }
        Err(e) => return Err(e),
    }

    Ok(())
}
