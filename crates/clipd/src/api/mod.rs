//! The request server.
//!
//! Exposes the ingestion service as a small JSON-over-HTTP API on a Unix
//! domain socket. The daemon only depends on the [`RequestServer`] contract;
//! [`ApiServer`] is the production implementation.

mod handlers;
pub mod types;

use std::future::{Future, IntoFuture};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::service::IngestionService;

pub use handlers::{router, AppState};

/// Contract between the daemon and whatever serves client requests.
#[async_trait]
pub trait RequestServer: Send + Sync + std::fmt::Debug {
    /// Serve until stopped or failed.
    ///
    /// Returns `Ok(())` after a requested stop. Cancellation of `cancel` also
    /// begins a graceful stop.
    async fn start(&self, cancel: CancellationToken) -> Result<()>;

    /// Stop serving, waiting at most `timeout` for in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] when requests had to be abandoned.
    async fn shutdown(&self, timeout: Duration) -> Result<()>;
}

/// HTTP server on a Unix domain socket.
///
/// Single use: once stopped it cannot be started again.
#[derive(Debug)]
pub struct ApiServer {
    socket_path: PathBuf,
    router: Router,
    started: AtomicBool,
    stop: CancellationToken,
    force: CancellationToken,
    done: CancellationToken,
}

impl ApiServer {
    /// Create a server for the given socket path.
    #[must_use]
    pub fn new(
        socket_path: impl Into<PathBuf>,
        service: IngestionService,
        request_timeout: Duration,
    ) -> Self {
        let router = router(AppState {
            service,
            request_timeout,
        });

        Self {
            socket_path: socket_path.into(),
            router,
            started: AtomicBool::new(false),
            stop: CancellationToken::new(),
            force: CancellationToken::new(),
            done: CancellationToken::new(),
        }
    }

    /// Path of the socket file.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    fn bind(&self) -> Result<UnixListener> {
        if let Some(parent) = self.socket_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        // The instance guard is already held, so an existing socket is stale.
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => debug!(path = %self.socket_path.display(), "Removed stale socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(self.bind_error(source)),
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| self.bind_error(e))?;

        if let Err(e) =
            std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o600))
        {
            self.remove_socket();
            return Err(self.bind_error(e));
        }

        Ok(listener)
    }

    /// Drive `serving` to completion, then remove the socket it was bound
    /// to whatever the outcome.
    async fn run_bound<F>(&self, serving: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        let result = serving.await;
        self.remove_socket();
        result
    }

    async fn serve(&self, listener: UnixListener, cancel: CancellationToken) -> Result<()> {
        info!(path = %self.socket_path.display(), "Request server listening");

        let stop = self.stop.clone();
        let graceful = async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = stop.cancelled() => {}
            }
        };

        let server = axum::serve(listener, self.router.clone()).with_graceful_shutdown(graceful);

        tokio::select! {
            result = server.into_future() => result.map_err(|e| Error::server(e.to_string())),
            () = self.force.cancelled() => {
                warn!("Request server forced to stop with requests in flight");
                Ok(())
            }
        }
    }

    fn bind_error(&self, source: std::io::Error) -> Error {
        Error::SocketBind {
            path: self.socket_path.clone(),
            source,
        }
    }

    fn remove_socket(&self) {
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => debug!(path = %self.socket_path.display(), "Removed socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, path = %self.socket_path.display(), "Failed to remove socket"),
        }
    }
}

#[async_trait]
impl RequestServer for ApiServer {
    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::server("request server already started"));
        }

        // A failed bind leaves whatever is at the path alone.
        let result = match self.bind() {
            Ok(listener) => self.run_bound(self.serve(listener, cancel)).await,
            Err(e) => Err(e),
        };
        self.done.cancel();

        info!("Request server stopped");
        result
    }

    async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.stop.cancel();

        if !self.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        if tokio::time::timeout(timeout, self.done.cancelled())
            .await
            .is_err()
        {
            self.force.cancel();
            return Err(Error::Timeout {
                operation: "request server shutdown".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Classifier;
    use crate::storage::SqliteStorage;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixStream;

    fn server_in(dir: &TempDir) -> Arc<ApiServer> {
        let service = IngestionService::new(
            Arc::new(SqliteStorage::open_in_memory().unwrap()),
            Arc::new(Classifier::new()),
        );
        Arc::new(ApiServer::new(
            dir.path().join("clipd.sock"),
            service,
            Duration::from_secs(5),
        ))
    }

    async fn connect(path: &Path) -> UnixStream {
        for _ in 0..200 {
            if let Ok(stream) = UnixStream::connect(path).await {
                return stream;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("socket never accepted at {}", path.display());
    }

    async fn raw_get(path: &Path, uri: &str) -> String {
        let mut stream = connect(path).await;
        let request = format!("GET {uri} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_serves_over_socket_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let server = server_in(&dir);
        let socket = server.socket_path().to_path_buf();
        let cancel = CancellationToken::new();

        let handle = {
            let server = Arc::clone(&server);
            let cancel = cancel.clone();
            tokio::spawn(async move { server.start(cancel).await })
        };

        let response = raw_get(&socket, "/api/health").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"status\":\"ok\""));

        // Serving only begins after the permissions are tightened.
        let mode = std::fs::metadata(&socket).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        server.shutdown(Duration::from_secs(5)).await.unwrap();
        handle.await.unwrap().unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn test_cancel_stops_server() {
        let dir = TempDir::new().unwrap();
        let server = server_in(&dir);
        let socket = server.socket_path().to_path_buf();
        let cancel = CancellationToken::new();

        let handle = {
            let server = Arc::clone(&server);
            let cancel = cancel.clone();
            tokio::spawn(async move { server.start(cancel).await })
        };

        drop(connect(&socket).await);
        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stale_socket_is_replaced() {
        let dir = TempDir::new().unwrap();
        let server = server_in(&dir);
        std::fs::write(server.socket_path(), b"stale").unwrap();

        let handle = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.start(CancellationToken::new()).await })
        };

        // Connecting succeeds only once the stale file is a live socket.
        drop(connect(server.socket_path()).await);

        server.shutdown(Duration::from_secs(5)).await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_lifecycle_error() {
        let dir = TempDir::new().unwrap();
        // A directory in the way of the socket path cannot be removed as a file.
        let blocked = dir.path().join("clipd.sock");
        std::fs::create_dir(&blocked).unwrap();

        let service = IngestionService::new(
            Arc::new(SqliteStorage::open_in_memory().unwrap()),
            Arc::new(Classifier::new()),
        );
        let server = ApiServer::new(&blocked, service, Duration::from_secs(5));

        let err = server.start(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::SocketBind { .. }));
        assert!(err.is_lifecycle());
    }

    #[tokio::test]
    async fn test_socket_removed_when_serving_fails() {
        let dir = TempDir::new().unwrap();
        let server = server_in(&dir);

        let _listener = server.bind().unwrap();
        assert!(server.socket_path().exists());

        let err = server
            .run_bound(async { Err(Error::server("accept loop died")) })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Server(ref m) if m == "accept loop died"));
        assert!(!server.socket_path().exists());
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let dir = TempDir::new().unwrap();
        let server = server_in(&dir);
        server.shutdown(Duration::from_millis(10)).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let dir = TempDir::new().unwrap();
        let server = server_in(&dir);
        server.shutdown(Duration::from_millis(10)).await.unwrap();

        // The stop was already requested, so the first start returns at once.
        server.start(CancellationToken::new()).await.unwrap();
        assert!(server.start(CancellationToken::new()).await.is_err());
    }
}
