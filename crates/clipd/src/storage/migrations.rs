//! Schema versioning for the history database.
//!
//! The version lives in the `metadata` table. A database without a version
//! row is treated as version 0 and brought forward one step at a time.

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::schema::SCHEMA_STATEMENTS;

/// The schema version this build expects.
pub const CURRENT_VERSION: i32 = 1;

const VERSION_KEY: &str = "schema_version";

/// Create the base schema and apply any pending migrations.
///
/// Safe to call on every open.
///
/// # Errors
///
/// Returns an error if schema creation or a migration step fails, or if the
/// database was written by a newer version of clipd.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let version = schema_version(conn)?;
    if version > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!(
                "database schema version {version} is newer than supported version {CURRENT_VERSION}"
            ),
        });
    }

    for step in (version + 1)..=CURRENT_VERSION {
        debug!("Applying schema migration {}", step);
        apply(conn, step)?;
        set_schema_version(conn, step)?;
    }

    if version < CURRENT_VERSION {
        info!("Schema migrated from version {} to {}", version, CURRENT_VERSION);
    }

    Ok(())
}

/// Read the stored schema version; 0 when none has been recorded.
fn schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        None => Ok(0),
        Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

fn apply(_conn: &Connection, version: i32) -> Result<()> {
    match version {
        // Version 1 is the base schema created above.
        1 => Ok(()),
        _ => Err(Error::DatabaseMigration {
            message: format!("unknown migration version: {version}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> Connection {
        Connection::open_in_memory().expect("failed to create in-memory database")
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_initialize_schema_creates_tables() {
        let conn = create_test_db();
        initialize_schema(&conn).expect("failed to initialize schema");

        assert!(table_exists(&conn, "entries"));
        assert!(table_exists(&conn, "metadata"));
    }

    #[test]
    fn test_initialize_schema_sets_version() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();

        assert_eq!(schema_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_initialize_schema_idempotent() {
        let conn = create_test_db();

        initialize_schema(&conn).expect("first init failed");
        initialize_schema(&conn).expect("second init failed");

        assert_eq!(schema_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_schema_version_fresh_db() {
        let conn = create_test_db();
        conn.execute(
            "CREATE TABLE metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .unwrap();

        assert_eq!(schema_version(&conn).unwrap(), 0);
    }

    #[test]
    fn test_invalid_version_value() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();
        conn.execute(
            "UPDATE metadata SET value = 'banana' WHERE key = ?1",
            [VERSION_KEY],
        )
        .unwrap();

        let err = schema_version(&conn).unwrap_err();
        assert!(err.to_string().contains("invalid schema version"));
    }

    #[test]
    fn test_newer_database_is_rejected() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();
        set_schema_version(&conn, CURRENT_VERSION + 1).unwrap();

        let err = initialize_schema(&conn).unwrap_err();
        assert!(matches!(err, Error::DatabaseMigration { .. }));
        assert!(err.to_string().contains("newer than supported"));
    }

    #[test]
    fn test_apply_unknown_version() {
        let conn = create_test_db();
        let err = apply(&conn, 999).unwrap_err();
        assert!(err.to_string().contains("unknown migration version"));
    }

    #[test]
    fn test_entries_columns_match_entry_fields() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();

        let columns: Vec<String> = conn
            .prepare("SELECT name FROM pragma_table_info('entries') ORDER BY cid")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(std::result::Result::ok)
            .collect();

        assert_eq!(columns, vec!["id", "content", "timestamp"]);
    }

    #[test]
    fn test_timestamp_index_created() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND tbl_name='entries'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(std::result::Result::ok)
            .collect();

        assert!(indexes.iter().any(|n| n.contains("timestamp")));
    }
}
