//! HTTP handlers.
//!
//! - GET    /api/health
//! - GET    /api/v1/history?limit=N
//! - DELETE /api/v1/history
//! - GET    /api/v1/history/{id}
//! - DELETE /api/v1/history/{id}
//! - POST   /api/v1/entries
//! - GET    /api/v1/search?q=...&limit=N
//! - GET    /api/v1/stats

use std::future::Future;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::types::{
    ApiError, CreateEntryRequest, EntriesResponse, HealthResponse, HistoryQuery,
    MessageResponse, SearchQuery, StatsResponse, DEFAULT_HISTORY_LIMIT,
};
use crate::entry::{CapturedValue, Entry};
use crate::error::{Error, Result};
use crate::service::IngestionService;

/// Shared state for every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The ingestion service every route delegates to.
    pub service: IngestionService,
    /// Deadline for a single request.
    pub request_timeout: Duration,
}

/// Build the router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/v1/history", get(history).delete(clear_history))
        .route("/api/v1/history/{id}", get(get_entry).delete(delete_entry))
        .route("/api/v1/entries", post(create_entry))
        .route("/api/v1/search", get(search))
        .route("/api/v1/stats", get(stats))
        .with_state(state)
}

/// Run one service call with its own cancellation token and deadline.
///
/// The token is cancelled when the request future is dropped, so work for a
/// disconnected client stops at the adapter's next check.
async fn scoped<T, F, Fut>(timeout: Duration, op: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match tokio::time::timeout(timeout, op(cancel)).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => Err(ApiError::from(Error::Timeout {
            operation: "request".to_string(),
        })),
    }
}

/// Parse a textual limit. Negative or malformed values become 0, which the
/// service treats as out of range.
fn parse_limit(raw: Option<&str>, default: i64) -> usize {
    let value = match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or(0),
    };
    usize::try_from(value).unwrap_or(0)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> std::result::Result<Json<EntriesResponse>, ApiError> {
    let limit = parse_limit(query.limit.as_deref(), DEFAULT_HISTORY_LIMIT);
    let entries = scoped(state.request_timeout, |cancel| async move {
        state.service.get_history(limit, &cancel).await
    })
    .await?;

    Ok(Json(entries.into()))
}

async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Entry>, ApiError> {
    let entry = scoped(state.request_timeout, |cancel| async move {
        state.service.get_entry(&id, &cancel).await
    })
    .await?;

    Ok(Json(entry))
}

async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<MessageResponse>, ApiError> {
    scoped(state.request_timeout, |cancel| async move {
        state.service.delete_entry(&id, &cancel).await
    })
    .await?;

    Ok(Json(MessageResponse::new("entry deleted")))
}

async fn clear_history(
    State(state): State<AppState>,
) -> std::result::Result<Json<MessageResponse>, ApiError> {
    scoped(state.request_timeout, |cancel| async move {
        state.service.clear_history(&cancel).await
    })
    .await?;

    Ok(Json(MessageResponse::new("history cleared")))
}

async fn create_entry(
    State(state): State<AppState>,
    Json(request): Json<CreateEntryRequest>,
) -> std::result::Result<(StatusCode, Json<Entry>), ApiError> {
    let value = request.content.map(CapturedValue::new);
    let entry = scoped(state.request_timeout, |cancel| async move {
        state.service.process_new_entry(value, &cancel).await
    })
    .await?;

    debug!(id = %entry.id, "Entry created over the API");
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> std::result::Result<Json<EntriesResponse>, ApiError> {
    // Absent limit maps to 0 and so to the service's default.
    let limit = parse_limit(query.limit.as_deref(), 0);
    let entries = scoped(state.request_timeout, |cancel| async move {
        state.service.search(&query.q, limit, &cancel).await
    })
    .await?;

    Ok(Json(entries.into()))
}

async fn stats(
    State(state): State<AppState>,
) -> std::result::Result<Json<StatsResponse>, ApiError> {
    let stats = scoped(state.request_timeout, |cancel| async move {
        state.service.get_stats(&cancel).await
    })
    .await?;

    Ok(Json(StatsResponse {
        total_entries: stats.total_entries,
        status: "running".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Classifier;
    use crate::service::tests::MockStorage;
    use crate::storage::{SqliteStorage, Storage};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app_with(storage: Arc<dyn Storage>) -> Router {
        router(AppState {
            service: IngestionService::new(storage, Arc::new(Classifier::new())),
            request_timeout: Duration::from_secs(5),
        })
    }

    fn sqlite_app() -> Router {
        app_with(Arc::new(SqliteStorage::open_in_memory().unwrap()))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 64)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn delete(uri: &str) -> Request<Body> {
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_entry(body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/entries")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let resp = sqlite_app().oneshot(get("/api/health")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_and_fetch_entry() {
        let app = sqlite_app();

        let resp = app
            .clone()
            .oneshot(post_entry(&serde_json::json!({"content": "hello"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = body_json(resp).await;
        let id = created["id"].as_str().unwrap().to_string();

        let resp = app
            .clone()
            .oneshot(get(&format!("/api/v1/history/{id}")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["content"], "hello");

        let resp = app.oneshot(get("/api/v1/history")).await.unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["total"], 1);
        assert_eq!(json["entries"][0]["id"], id.as_str());
    }

    #[tokio::test]
    async fn test_create_sensitive_is_bad_request() {
        let resp = sqlite_app()
            .oneshot(post_entry(&serde_json::json!({"content": "password: hunter2"})))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "Bad Request");
        assert!(json["message"].as_str().unwrap().contains("contains password"));
    }

    #[tokio::test]
    async fn test_create_without_content_is_nil_entry() {
        let resp = sqlite_app()
            .oneshot(post_entry(&serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["message"], "entry cannot be nil");
    }

    #[tokio::test]
    async fn test_history_limit_validation() {
        let app = sqlite_app();

        for uri in [
            "/api/v1/history?limit=0",
            "/api/v1/history?limit=101",
            "/api/v1/history?limit=-3",
            "/api/v1/history?limit=abc",
        ] {
            let resp = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
        }

        let resp = app.oneshot(get("/api/v1/history?limit=100")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_history_default_limit() {
        let storage = Arc::new(MockStorage::default());
        let app = app_with(Arc::clone(&storage) as Arc<dyn Storage>);

        let resp = app.oneshot(get("/api/v1/history")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(storage.calls(), vec!["get_recent:10"]);
    }

    #[tokio::test]
    async fn test_missing_entry_is_not_found() {
        let app = sqlite_app();

        let resp = app.clone().oneshot(get("/api/v1/history/42")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "Not Found");

        let resp = app.oneshot(delete("/api/v1/history/42")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_search() {
        let storage = Arc::new(MockStorage::default());
        let app = app_with(Arc::clone(&storage) as Arc<dyn Storage>);

        let resp = app.clone().oneshot(get("/api/v1/search")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .clone()
            .oneshot(get("/api/v1/search?q=foo"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(get("/api/v1/search?q=foo&limit=5000"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        assert_eq!(storage.calls(), vec!["search:foo:100", "search:foo:100"]);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let app = sqlite_app();

        let resp = app
            .clone()
            .oneshot(post_entry(&serde_json::json!({"content": "one"})))
            .await
            .unwrap();
        let id = body_json(resp).await["id"].as_str().unwrap().to_string();

        let resp = app
            .clone()
            .oneshot(delete(&format!("/api/v1/history/{id}")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["message"], "entry deleted");

        let resp = app.clone().oneshot(delete("/api/v1/history")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["message"], "history cleared");
    }

    #[tokio::test]
    async fn test_stats() {
        let app = sqlite_app();
        app.clone()
            .oneshot(post_entry(&serde_json::json!({"content": "one"})))
            .await
            .unwrap();

        let resp = app.oneshot(get("/api/v1/stats")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["total_entries"], 1);
        assert_eq!(json["status"], "running");
    }

    #[tokio::test]
    async fn test_storage_failure_is_internal_error() {
        let app = app_with(Arc::new(MockStorage::failing()));

        let resp = app.oneshot(get("/api/v1/stats")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"], "Internal Server Error");
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None, 10), 10);
        assert_eq!(parse_limit(Some("25"), 10), 25);
        assert_eq!(parse_limit(Some("-1"), 10), 0);
        assert_eq!(parse_limit(Some("x"), 10), 0);
    }
}
