//! The ingestion service.
//!
//! [`IngestionService`] is the single gate between captured clipboard values
//! and the store. It validates input, runs the analyzer, and refuses
//! sensitive content before any persistence call is made. Every other
//! operation validates its arguments locally and then delegates to the
//! storage adapter.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::analyzer::Analyzer;
use crate::entry::{CapturedValue, Entry};
use crate::error::{Error, Result};
use crate::storage::Storage;

/// Largest page `get_history` accepts.
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Largest page `search` honours before falling back to the default.
pub const MAX_SEARCH_LIMIT: usize = 1000;

/// Page size used when a search limit is out of range.
pub const DEFAULT_SEARCH_LIMIT: usize = 100;

/// Summary numbers about the stored history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Number of stored entries.
    pub total_entries: u64,
}

/// Validation, classification, and delegation in front of the store.
#[derive(Debug, Clone)]
pub struct IngestionService {
    storage: Arc<dyn Storage>,
    analyzer: Arc<dyn Analyzer>,
}

impl IngestionService {
    /// Create a service over the given store and analyzer.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, analyzer: Arc<dyn Analyzer>) -> Self {
        Self { storage, analyzer }
    }

    /// Validate, classify, and persist one captured value.
    ///
    /// # Errors
    ///
    /// - [`Error::NilEntry`] when no value is supplied
    /// - [`Error::EmptyContent`] when the value is empty
    /// - [`Error::SensitiveContent`] when the analyzer flags it; storage is
    ///   never called in this case
    /// - [`Error::StorageFailure`] when the adapter fails
    pub async fn process_new_entry(
        &self,
        value: Option<CapturedValue>,
        cancel: &CancellationToken,
    ) -> Result<Entry> {
        let value = value.ok_or(Error::NilEntry)?;
        if value.is_empty() {
            return Err(Error::EmptyContent);
        }

        let verdict = self.analyzer.analyze(&value.content);
        if verdict.is_sensitive {
            return Err(Error::sensitive(verdict.reason));
        }

        let entry = self
            .storage
            .store(cancel, &value.content, value.captured_at)
            .await
            .map_err(|e| Error::storage("store", e))?;

        debug!(id = %entry.id, content_type = %verdict.content_type, "Stored entry");
        Ok(entry)
    }

    /// The most recent `limit` entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLimit`] unless `1 <= limit <= 100`, or a
    /// storage failure.
    pub async fn get_history(&self, limit: usize, cancel: &CancellationToken) -> Result<Vec<Entry>> {
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(Error::InvalidLimit);
        }

        self.storage
            .get_recent(cancel, limit)
            .await
            .map_err(|e| Error::storage("get history", e))
    }

    /// Fetch a single entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] for an empty id, [`Error::NotFound`] when
    /// the entry does not exist, or a storage failure.
    pub async fn get_entry(&self, id: &str, cancel: &CancellationToken) -> Result<Entry> {
        if id.is_empty() {
            return Err(Error::InvalidId);
        }

        self.storage
            .get_by_id(cancel, id)
            .await
            .map_err(|e| Error::storage("get entry", e))?
            .ok_or(Error::NotFound)
    }

    /// Delete a single entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] for an empty id, [`Error::NotFound`] when
    /// the entry does not exist, or a storage failure.
    pub async fn delete_entry(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidId);
        }

        let deleted = self
            .storage
            .delete(cancel, id)
            .await
            .map_err(|e| Error::storage("delete entry", e))?;

        if deleted {
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }

    /// Case-insensitive substring search, newest first.
    ///
    /// A limit of zero or above 1000 falls back to 100.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyQuery`] for an empty query, or a storage failure.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Entry>> {
        if query.is_empty() {
            return Err(Error::EmptyQuery);
        }

        let limit = if limit == 0 || limit > MAX_SEARCH_LIMIT {
            DEFAULT_SEARCH_LIMIT
        } else {
            limit
        };

        self.storage
            .search(cancel, query, limit)
            .await
            .map_err(|e| Error::storage("search", e))
    }

    /// Remove every entry.
    ///
    /// # Errors
    ///
    /// Returns a storage failure.
    pub async fn clear_history(&self, cancel: &CancellationToken) -> Result<()> {
        self.storage
            .clear(cancel)
            .await
            .map_err(|e| Error::storage("clear history", e))
    }

    /// Remove entries captured before `cutoff`, returning how many went.
    ///
    /// # Errors
    ///
    /// Returns a storage failure.
    pub async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        self.storage
            .delete_older_than(cancel, cutoff)
            .await
            .map_err(|e| Error::storage("delete older than", e))
    }

    /// Summary statistics.
    ///
    /// # Errors
    ///
    /// Returns a storage failure.
    pub async fn get_stats(&self, cancel: &CancellationToken) -> Result<Stats> {
        let total_entries = self
            .storage
            .count(cancel)
            .await
            .map_err(|e| Error::storage("get stats", e))?;

        Ok(Stats { total_entries })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analyzer::Classifier;
    use crate::storage::SqliteStorage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// A storage double that records every call and can be told to fail.
    #[derive(Debug, Default)]
    pub(crate) struct MockStorage {
        calls: Mutex<Vec<String>>,
        fail: bool,
        missing: bool,
    }

    impl MockStorage {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn empty() -> Self {
            Self {
                missing: true,
                ..Self::default()
            }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                Err(Error::internal("backend unavailable"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Storage for MockStorage {
        async fn store(
            &self,
            _cancel: &CancellationToken,
            content: &str,
            timestamp: DateTime<Utc>,
        ) -> Result<Entry> {
            self.record(format!("store:{content}"))?;
            Ok(Entry {
                id: "1".to_string(),
                content: content.to_string(),
                timestamp,
            })
        }

        async fn get_recent(&self, _cancel: &CancellationToken, limit: usize) -> Result<Vec<Entry>> {
            self.record(format!("get_recent:{limit}"))?;
            Ok(Vec::new())
        }

        async fn get_by_id(&self, _cancel: &CancellationToken, id: &str) -> Result<Option<Entry>> {
            self.record(format!("get_by_id:{id}"))?;
            if self.missing {
                return Ok(None);
            }
            Ok(Some(Entry {
                id: id.to_string(),
                content: "found".to_string(),
                timestamp: Utc::now(),
            }))
        }

        async fn delete(&self, _cancel: &CancellationToken, id: &str) -> Result<bool> {
            self.record(format!("delete:{id}"))?;
            Ok(!self.missing)
        }

        async fn search(
            &self,
            _cancel: &CancellationToken,
            query: &str,
            limit: usize,
        ) -> Result<Vec<Entry>> {
            self.record(format!("search:{query}:{limit}"))?;
            Ok(Vec::new())
        }

        async fn count(&self, _cancel: &CancellationToken) -> Result<u64> {
            self.record("count".to_string())?;
            Ok(42)
        }

        async fn clear(&self, _cancel: &CancellationToken) -> Result<()> {
            self.record("clear".to_string())
        }

        async fn delete_older_than(
            &self,
            _cancel: &CancellationToken,
            _cutoff: DateTime<Utc>,
        ) -> Result<usize> {
            self.record("delete_older_than".to_string())?;
            Ok(3)
        }
    }

    fn service_with(storage: &Arc<MockStorage>) -> IngestionService {
        IngestionService::new(
            Arc::clone(storage) as Arc<dyn Storage>,
            Arc::new(Classifier::new()),
        )
    }

    #[tokio::test]
    async fn test_empty_content_never_reaches_storage() {
        let storage = Arc::new(MockStorage::default());
        let service = service_with(&storage);

        let err = service
            .process_new_entry(Some(CapturedValue::new("")), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::EmptyContent));
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_absent_value_is_nil_entry() {
        let storage = Arc::new(MockStorage::default());
        let service = service_with(&storage);

        let err = service
            .process_new_entry(None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NilEntry));
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sensitive_content_never_reaches_storage() {
        let storage = Arc::new(MockStorage::default());
        let service = service_with(&storage);

        let err = service
            .process_new_entry(
                Some(CapturedValue::new("password: abc123")),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            Error::SensitiveContent { reason } => assert_eq!(reason, "contains password"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_accepted_content_is_stored_once() {
        let storage = Arc::new(MockStorage::default());
        let service = service_with(&storage);

        let entry = service
            .process_new_entry(
                Some(CapturedValue::new("https://example.com")),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(entry.content, "https://example.com");
        assert_eq!(storage.calls(), vec!["store:https://example.com"]);
    }

    #[tokio::test]
    async fn test_store_failure_is_wrapped() {
        let storage = Arc::new(MockStorage::failing());
        let service = service_with(&storage);

        let err = service
            .process_new_entry(Some(CapturedValue::new("hello")), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::StorageFailure { operation: "store", .. }));
    }

    #[tokio::test]
    async fn test_history_limit_bounds() {
        let storage = Arc::new(MockStorage::default());
        let service = service_with(&storage);
        let cancel = CancellationToken::new();

        assert!(matches!(
            service.get_history(0, &cancel).await.unwrap_err(),
            Error::InvalidLimit
        ));
        assert!(matches!(
            service.get_history(101, &cancel).await.unwrap_err(),
            Error::InvalidLimit
        ));
        assert!(storage.calls().is_empty());

        service.get_history(50, &cancel).await.unwrap();
        service.get_history(1, &cancel).await.unwrap();
        service.get_history(100, &cancel).await.unwrap();
        assert_eq!(
            storage.calls(),
            vec!["get_recent:50", "get_recent:1", "get_recent:100"]
        );
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let storage = Arc::new(MockStorage::default());
        let service = service_with(&storage);
        let cancel = CancellationToken::new();

        assert!(matches!(
            service.get_entry("", &cancel).await.unwrap_err(),
            Error::InvalidId
        ));
        assert!(matches!(
            service.delete_entry("", &cancel).await.unwrap_err(),
            Error::InvalidId
        ));
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_absence_normalized_to_not_found() {
        let storage = Arc::new(MockStorage::empty());
        let service = service_with(&storage);
        let cancel = CancellationToken::new();

        assert!(service.get_entry("7", &cancel).await.unwrap_err().is_not_found());
        assert!(service
            .delete_entry("7", &cancel)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_get_and_delete_existing() {
        let storage = Arc::new(MockStorage::default());
        let service = service_with(&storage);
        let cancel = CancellationToken::new();

        let entry = service.get_entry("7", &cancel).await.unwrap();
        assert_eq!(entry.id, "7");
        service.delete_entry("7", &cancel).await.unwrap();
        assert_eq!(storage.calls(), vec!["get_by_id:7", "delete:7"]);
    }

    #[tokio::test]
    async fn test_search_validation_and_clamp() {
        let storage = Arc::new(MockStorage::default());
        let service = service_with(&storage);
        let cancel = CancellationToken::new();

        assert!(matches!(
            service.search("", 10, &cancel).await.unwrap_err(),
            Error::EmptyQuery
        ));
        assert!(storage.calls().is_empty());

        service.search("foo", 0, &cancel).await.unwrap();
        service.search("foo", 1001, &cancel).await.unwrap();
        service.search("foo", 1000, &cancel).await.unwrap();
        service.search("foo", 5, &cancel).await.unwrap();

        assert_eq!(
            storage.calls(),
            vec![
                "search:foo:100",
                "search:foo:100",
                "search:foo:1000",
                "search:foo:5"
            ]
        );
    }

    #[tokio::test]
    async fn test_clear_retention_and_stats_delegate() {
        let storage = Arc::new(MockStorage::default());
        let service = service_with(&storage);
        let cancel = CancellationToken::new();

        service.clear_history(&cancel).await.unwrap();
        assert_eq!(service.delete_older_than(Utc::now(), &cancel).await.unwrap(), 3);
        assert_eq!(service.get_stats(&cancel).await.unwrap().total_entries, 42);

        assert_eq!(storage.calls(), vec!["clear", "delete_older_than", "count"]);
    }

    #[tokio::test]
    async fn test_failures_wrapped_for_every_operation() {
        let storage = Arc::new(MockStorage::failing());
        let service = service_with(&storage);
        let cancel = CancellationToken::new();

        let errors = vec![
            service.get_history(10, &cancel).await.unwrap_err(),
            service.get_entry("1", &cancel).await.unwrap_err(),
            service.delete_entry("1", &cancel).await.unwrap_err(),
            service.search("q", 10, &cancel).await.unwrap_err(),
            service.clear_history(&cancel).await.unwrap_err(),
            service.delete_older_than(Utc::now(), &cancel).await.unwrap_err(),
            service.get_stats(&cancel).await.unwrap_err(),
        ];

        for err in errors {
            assert!(matches!(err, Error::StorageFailure { .. }), "got {err}");
        }
    }

    #[tokio::test]
    async fn test_end_to_end_with_sqlite() {
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let service = IngestionService::new(storage, Arc::new(Classifier::new()));
        let cancel = CancellationToken::new();

        let stored = service
            .process_new_entry(Some(CapturedValue::new("def main():")), &cancel)
            .await
            .unwrap();
        let _ = service
            .process_new_entry(Some(CapturedValue::new("token: abcdefghijklmnopqrstuvwxyz")), &cancel)
            .await
            .unwrap_err();

        let history = service.get_history(10, &cancel).await.unwrap();
        assert_eq!(history, vec![stored.clone()]);
        assert_eq!(service.get_entry(&stored.id, &cancel).await.unwrap(), stored);
        assert!(service.get_entry("999", &cancel).await.unwrap_err().is_not_found());
        assert_eq!(service.get_stats(&cancel).await.unwrap().total_entries, 1);
    }
}
