//! Single-instance guard backed by a pid file.
//!
//! The marker holds the owning process id in decimal followed by a newline.
//! A missing marker means no instance is running. A marker naming a dead
//! process is stale and is replaced on the next acquire.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Result of inspecting the marker without changing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// Whether the recorded process is alive.
    pub alive: bool,
    /// The recorded process id; 0 when there is no marker.
    pub pid: i32,
}

/// Guards a well-known path so at most one daemon runs at a time.
#[derive(Debug, Clone)]
pub struct InstanceGuard {
    path: PathBuf,
}

impl InstanceGuard {
    /// Create a guard for the given marker path. Nothing is touched until
    /// [`acquire`](Self::acquire) is called.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the marker file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Claim the marker for the current process.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyRunning`] when the marker names a live process
    /// - [`Error::PidFile`] when the marker cannot be read, parsed, or written
    pub fn acquire(&self) -> Result<()> {
        let probe = self.probe()?;
        if probe.alive {
            return Err(Error::AlreadyRunning { pid: probe.pid });
        }

        if probe.pid != 0 {
            warn!(pid = probe.pid, path = %self.path.display(), "Removing stale instance marker");
            self.remove_if_holds(probe.pid)?;
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let pid = std::process::id();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(&self.path);

        let mut file = match file {
            Ok(file) => file,
            // Another instance won the race between our probe and create.
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let pid = self.read_pid()?.unwrap_or(0);
                return Err(Error::AlreadyRunning { pid });
            }
            Err(source) => return Err(self.pid_file_error(source)),
        };

        writeln!(file, "{pid}").map_err(|source| self.pid_file_error(source))?;

        info!(pid, path = %self.path.display(), "Instance marker acquired");
        Ok(())
    }

    /// Remove the marker. Removing an absent marker succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PidFile`] if the file exists but cannot be removed.
    pub fn release(&self) -> Result<()> {
        self.remove()?;
        debug!(path = %self.path.display(), "Instance marker released");
        Ok(())
    }

    /// Report whether the recorded process is alive, without mutating anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PidFile`] if the marker cannot be read or holds
    /// something other than a process id, or [`Error::Signal`] if the
    /// liveness check fails for a reason other than a missing process.
    pub fn probe(&self) -> Result<Probe> {
        let Some(pid) = self.read_pid()? else {
            return Ok(Probe { alive: false, pid: 0 });
        };

        Ok(Probe {
            alive: is_alive(pid)?,
            pid,
        })
    }

    /// Deliver `signal` to the process recorded in the marker.
    ///
    /// Returns the pid that was signalled.
    ///
    /// # Errors
    ///
    /// - [`Error::DaemonNotRunning`] when there is no marker or it is stale
    /// - [`Error::Signal`] when delivery fails
    pub fn notify(&self, signal: Signal) -> Result<i32> {
        let probe = self.probe()?;
        if !probe.alive {
            return Err(Error::DaemonNotRunning);
        }

        kill(Pid::from_raw(probe.pid), signal).map_err(|source| Error::Signal {
            pid: probe.pid,
            source,
        })?;

        debug!(pid = probe.pid, signal = %signal, "Signalled daemon");
        Ok(probe.pid)
    }

    fn read_pid(&self) -> Result<Option<i32>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.pid_file_error(source)),
        };

        contents.trim().parse().map(Some).map_err(|e| {
            self.pid_file_error(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid PID in file: {e}"),
            ))
        })
    }

    fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.pid_file_error(source)),
        }
    }

    /// Remove the marker only while it still names `pid`.
    ///
    /// A starter racing us may already have replaced a stale marker with its
    /// own; that marker is left in place.
    fn remove_if_holds(&self, pid: i32) -> Result<()> {
        match self.read_pid() {
            Ok(Some(current)) if current == pid => self.remove(),
            Ok(_) => {
                debug!(pid, path = %self.path.display(), "Stale marker already replaced");
                Ok(())
            }
            // A racing starter may have created it without writing its pid yet.
            Err(Error::PidFile { .. }) if self.path.exists() => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn pid_file_error(&self, source: io::Error) -> Error {
        Error::PidFile {
            path: self.path.clone(),
            source,
        }
    }
}

/// Probe a process with the null signal.
///
/// `ESRCH` means the process is gone. `EPERM` means it exists but belongs to
/// someone else.
fn is_alive(pid: i32) -> Result<bool> {
    // Non-positive ids address process groups, never a single daemon.
    if pid <= 0 {
        return Ok(false);
    }

    match kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(source) => Err(Error::Signal { pid, source }),
    }
}
