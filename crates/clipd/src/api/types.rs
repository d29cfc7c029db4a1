//! Request and response bodies for the HTTP interface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::error::Error;

/// Default page size for `GET /api/v1/history`.
pub const DEFAULT_HISTORY_LIMIT: i64 = 10;

/// `GET /api/health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok` while the server answers.
    pub status: String,
}

/// A page of entries.
#[derive(Debug, Serialize, Deserialize)]
pub struct EntriesResponse {
    /// Entries, newest first.
    pub entries: Vec<Entry>,
    /// Number of entries in this page.
    pub total: usize,
}

impl From<Vec<Entry>> for EntriesResponse {
    fn from(entries: Vec<Entry>) -> Self {
        Self {
            total: entries.len(),
            entries,
        }
    }
}

/// Acknowledgement for mutating requests with nothing else to return.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable outcome.
    pub message: String,
}

impl MessageResponse {
    /// Wrap a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `GET /api/v1/stats`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Number of stored entries.
    pub total_entries: u64,
    /// Daemon status; `running` while it answers.
    pub status: String,
}

/// `POST /api/v1/entries`. A missing `content` is reported as a nil entry.
#[derive(Debug, Default, Deserialize)]
pub struct CreateEntryRequest {
    /// Text to store.
    #[serde(default)]
    pub content: Option<String>,
}

/// `?limit=` on the history endpoint. Kept as text so a malformed value
/// is reported as an invalid limit instead of a generic rejection.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Page size.
    pub limit: Option<String>,
}

/// `?q=&limit=` on the search endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    /// Substring to look for.
    #[serde(default)]
    pub q: String,
    /// Maximum number of results.
    pub limit: Option<String>,
}

/// Error body: `{"error": <status text>, "message": <detail>}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Canonical status text.
    pub error: String,
    /// What went wrong.
    pub message: String,
}

/// An [`Error`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    /// Response status.
    pub status: StatusCode,
    /// Error detail.
    pub message: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else if err.is_validation() || err.is_policy_rejection() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self
                .status
                .canonical_reason()
                .unwrap_or("Unknown")
                .to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
