//! HTTP server for the covers agent API.
//!
//! Streams of assistant events are relayed as NDJSON, one [`StreamEvent`] per
//! line; search, thread creation and file download are plain request/response.
//!
//! [`StreamEvent`]: crate::conversation::StreamEvent

pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;

/// Boxed error returned by the server entry points.
pub type ServerError = Box<dyn std::error::Error + Send + Sync>;

/// Bind the listening socket on all interfaces.
///
/// # Errors
/// Returns an error if the port cannot be bound.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    Ok(TcpListener::bind(addr).await?)
}

/// Serve the API on `listener` until `shutdown_signal` completes.
///
/// In-flight streams are drained before returning.
///
/// # Errors
/// Returns an error if the server fails while accepting connections.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown_signal: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Covers agent server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use super::*;
    use crate::conversation::SessionManager;
    use crate::conversation::session::testing::{FakeService, ManualClock};
    use crate::execution::ExecutionService;
    use crate::search::SearchService;

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let service: Arc<dyn ExecutionService> = Arc::new(FakeService::new());
        let session = SessionManager::new(service, "asst_1").with_clock(Arc::new(ManualClock::new()));
        let state = AppState::new(session, Arc::new(SearchService::with_defaults().unwrap()));

        let listener = bind(&ServerConfig { port: 0 }).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, state, async {
            let _ = stopped.await;
        }));

        let response = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/threads"))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["threadId"], "thread_1");

        stop.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
