//! HTTP server for switchboard (axum + SSE).
//!
//! Routes: `POST /invoke`, `POST /stream`, `GET /nodes`, `GET /health`.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`], [`AppState`].

mod app;
mod routes;

pub use app::AppState;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

const DEFAULT_ADDR: &str = "0.0.0.0:8000";

/// Runs the server on an existing listener. Used by tests (bind to
/// 127.0.0.1:0 then pass the listener in).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!(%addr, "http server listening");
    let app = app::router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Binds `addr` (default 0.0.0.0:8000) and serves until the process exits.
pub async fn run_serve(
    addr: Option<&str>,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr.unwrap_or(DEFAULT_ADDR);
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, state).await
}
