//! `SQLite` schema definitions for clipd.
//!
//! This module contains the SQL statements for creating and managing
//! the history database.

/// SQL statement to create the entries table.
pub const CREATE_ENTRIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL
)
";

/// SQL statement to create an index on timestamp for history and retention queries.
pub const CREATE_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_entries_timestamp ON entries(timestamp DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_ENTRIES_TABLE,
    CREATE_TIMESTAMP_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.trim().is_empty());
        }
    }

    #[test]
    fn test_create_entries_table_contains_required_columns() {
        assert!(CREATE_ENTRIES_TABLE.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(CREATE_ENTRIES_TABLE.contains("content TEXT NOT NULL"));
        assert!(CREATE_ENTRIES_TABLE.contains("timestamp TEXT NOT NULL"));
    }

    #[test]
    fn test_create_metadata_table_structure() {
        assert!(CREATE_METADATA_TABLE.contains("key TEXT PRIMARY KEY"));
        assert!(CREATE_METADATA_TABLE.contains("value TEXT NOT NULL"));
    }
}
