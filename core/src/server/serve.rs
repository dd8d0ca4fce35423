//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::CoreError;
use crate::server::handlers::{
    execute_handler, health_handler, read_handler, version_handler, write_handler,
};
use crate::server::state::ServerState;
use crate::server::ws::ws_handler;

/// Routes of the inbound API
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Operations
        .route("/read", post(read_handler))
        .route("/write", post(write_handler))
        .route("/execute", post(execute_handler))
        // Live updates
        .route("/ws/update", get(ws_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind the listener described by `options`
pub async fn bind(options: &ServerOptions) -> Result<TcpListener, CoreError> {
    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);
    TcpListener::bind(&addr)
        .await
        .map_err(|e| CoreError::ServerError(format!("failed to bind {}: {}", addr, e)))
}

/// Serve the inbound API on `listener` until `shutdown_signal` resolves
pub fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> JoinHandle<Result<(), CoreError>> {
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| CoreError::ServerError(e.to_string()))
    })
}
