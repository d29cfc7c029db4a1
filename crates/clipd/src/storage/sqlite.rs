//! `SQLite`-backed storage adapter.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{migrations, Storage};
use crate::entry::Entry;
use crate::error::{Error, Result};

const SELECT_COLUMNS: &str = "SELECT id, content, timestamp FROM entries";

/// Clipboard history persisted in a single `SQLite` file.
///
/// The connection is shared behind a mutex and every query runs on the
/// blocking thread pool, so the adapter can be cloned freely and used from any
/// number of tasks.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open or create a history database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist,
    /// then brings the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        prepare(&conn).map_err(|e| match e {
            Error::DatabaseQuery(source) => Error::DatabaseOpen {
                path: path.clone(),
                source,
            },
            other => other,
        })?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database, mostly useful for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let path = PathBuf::from(":memory:");
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` against the connection on the blocking pool.
    ///
    /// Returns [`Error::Cancelled`] if the token fires before or while the
    /// query runs. A query that has already started is allowed to finish in
    /// the background.
    async fn run<T, F>(&self, cancel: &CancellationToken, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| Error::internal("database connection lock poisoned"))?;
            op(&guard)
        });

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            joined = task => joined.map_err(|e| Error::internal(format!("storage task failed: {e}")))?,
        }
    }
}

/// Connection settings and schema, applied on every open.
fn prepare(conn: &Connection) -> Result<()> {
    // WAL lets CLI readers run alongside the daemon's writers.
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    migrations::initialize_schema(conn)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn store(
        &self,
        cancel: &CancellationToken,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Entry> {
        let content = content.to_string();
        // Stored at microsecond precision; return what a later read will see.
        let timestamp = timestamp.trunc_subsecs(6);
        self.run(cancel, move |conn| {
            conn.execute(
                "INSERT INTO entries (content, timestamp) VALUES (?1, ?2)",
                params![content, format_timestamp(timestamp)],
            )?;

            let id = conn.last_insert_rowid();
            debug!("Inserted entry with id {}", id);
            Ok(Entry {
                id: id.to_string(),
                content,
                timestamp,
            })
        })
        .await
    }

    async fn get_recent(&self, cancel: &CancellationToken, limit: usize) -> Result<Vec<Entry>> {
        let limit = to_sql_limit(limit);
        self.run(cancel, move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} ORDER BY timestamp DESC, id DESC LIMIT ?1"
            ))?;
            let entries = stmt
                .query_map([limit], row_to_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }

    async fn get_by_id(&self, cancel: &CancellationToken, id: &str) -> Result<Option<Entry>> {
        let Some(rowid) = parse_id(id) else {
            return Ok(None);
        };

        self.run(cancel, move |conn| {
            let entry = conn
                .query_row(
                    &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                    [rowid],
                    row_to_entry,
                )
                .optional()?;
            Ok(entry)
        })
        .await
    }

    async fn delete(&self, cancel: &CancellationToken, id: &str) -> Result<bool> {
        let Some(rowid) = parse_id(id) else {
            return Ok(false);
        };

        self.run(cancel, move |conn| {
            let affected = conn.execute("DELETE FROM entries WHERE id = ?1", [rowid])?;
            Ok(affected > 0)
        })
        .await
    }

    async fn search(
        &self,
        cancel: &CancellationToken,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Entry>> {
        let pattern = format!("%{}%", escape_like(query));
        let limit = to_sql_limit(limit);
        self.run(cancel, move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE content LIKE ?1 ESCAPE '\\' \
                 ORDER BY timestamp DESC, id DESC LIMIT ?2"
            ))?;
            let entries = stmt
                .query_map(params![pattern, limit], row_to_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }

    async fn count(&self, cancel: &CancellationToken) -> Result<u64> {
        self.run(cancel, |conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
        .await
    }

    async fn clear(&self, cancel: &CancellationToken) -> Result<()> {
        self.run(cancel, |conn| {
            let affected = conn.execute("DELETE FROM entries", [])?;
            info!("Cleared {} entries", affected);
            Ok(())
        })
        .await
    }

    async fn delete_older_than(
        &self,
        cancel: &CancellationToken,
        cutoff: DateTime<Utc>,
    ) -> Result<usize> {
        let cutoff = format_timestamp(cutoff);
        self.run(cancel, move |conn| {
            let affected = conn.execute("DELETE FROM entries WHERE timestamp < ?1", [cutoff])?;
            if affected > 0 {
                debug!("Deleted {} entries older than cutoff", affected);
            }
            Ok(affected)
        })
        .await
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Identifiers are decimal row ids; anything else cannot exist.
fn parse_id(id: &str) -> Option<i64> {
    id.parse().ok()
}

fn to_sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
    let id: i64 = row.get(0)?;
    let content: String = row.get(1)?;
    let timestamp_str: String = row.get(2)?;

    let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(Entry {
        id: id.to_string(),
        content,
        timestamp,
    })
}
