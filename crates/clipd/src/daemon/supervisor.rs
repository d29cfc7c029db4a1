//! Supervised task group.
//!
//! Tasks share one cancellation token. The first task to fail with anything
//! other than cancellation cancels the token; the group then waits for every
//! task and reports that first failure.

use std::future::Future;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// A set of cancellable tasks with first-failure-cancels-all semantics.
#[derive(Debug)]
pub struct TaskGroup {
    cancel: CancellationToken,
    tasks: JoinSet<(&'static str, Result<()>)>,
}

impl TaskGroup {
    /// Create a group whose token is a child of `parent`.
    ///
    /// Cancelling `parent` stops the group; a failure inside the group does
    /// not cancel `parent`.
    #[must_use]
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            cancel: parent.child_token(),
            tasks: JoinSet::new(),
        }
    }

    /// The token every task in the group should observe.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of tasks still owned by the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the group owns no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawn a named task.
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        debug!(task = name, "Starting supervised task");
        self.tasks.spawn(async move { (name, task.await) });
    }

    /// Wait for every task to finish.
    ///
    /// # Errors
    ///
    /// Returns the first non-cancellation error any task produced. A panicking
    /// task counts as a failure.
    pub async fn wait(mut self) -> Result<()> {
        let mut first: Option<Error> = None;

        while let Some(joined) = self.tasks.join_next().await {
            let (name, result) = joined.unwrap_or_else(|e| {
                ("unknown", Err(Error::internal(format!("task panicked: {e}"))))
            });

            match result {
                Ok(()) => debug!(task = name, "Supervised task finished"),
                Err(e) if e.is_cancelled() => debug!(task = name, "Supervised task cancelled"),
                Err(e) if first.is_none() => {
                    error!(task = name, error = %e, "Supervised task failed, cancelling the rest");
                    self.cancel.cancel();
                    first = Some(e);
                }
                Err(e) => warn!(task = name, error = %e, "Supervised task failed during shutdown"),
            }
        }

        first.map_or(Ok(()), Err)
    }
}
