//! Storage layer for clipd.
//!
//! The [`Storage`] trait is the contract the ingestion service depends on.
//! [`SqliteStorage`] is the production adapter.
//!
//! Every operation takes the caller's cancellation token and returns
//! [`Error::Cancelled`](crate::error::Error::Cancelled) once it fires. Absence
//! is reported structurally (`Option`, `bool`) and never as an error; mapping
//! absence to a lookup fault is the caller's business.

pub mod migrations;
pub mod schema;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::entry::Entry;
use crate::error::Result;

pub use sqlite::SqliteStorage;

/// Persistence contract for clipboard history.
///
/// Implementations must be safe for concurrent use: the polling loop, the
/// retention loop, and the request server all call in at the same time.
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Persist content and return the entry with its assigned identifier.
    async fn store(
        &self,
        cancel: &CancellationToken,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Entry>;

    /// The most recent `limit` entries, newest first.
    async fn get_recent(&self, cancel: &CancellationToken, limit: usize) -> Result<Vec<Entry>>;

    /// Look up an entry by identifier.
    async fn get_by_id(&self, cancel: &CancellationToken, id: &str) -> Result<Option<Entry>>;

    /// Delete an entry. Returns `false` when no such entry exists.
    async fn delete(&self, cancel: &CancellationToken, id: &str) -> Result<bool>;

    /// Case-insensitive substring search, newest first.
    async fn search(
        &self,
        cancel: &CancellationToken,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Entry>>;

    /// Number of stored entries.
    async fn count(&self, cancel: &CancellationToken) -> Result<u64>;

    /// Remove every entry.
    async fn clear(&self, cancel: &CancellationToken) -> Result<()>;

    /// Remove entries captured strictly before `cutoff`. Returns how many were removed.
    async fn delete_older_than(
        &self,
        cancel: &CancellationToken,
        cutoff: DateTime<Utc>,
    ) -> Result<usize>;
}
