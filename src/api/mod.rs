//! REST API over a running dispatch engine.
//!
//! Read-only reporting endpoints plus DR event ingress:
//! - `GET /status` - revision, failure streak, battery state
//! - `GET /measurements?limit=N` - recent measurements
//! - `GET /plans/latest`, `GET /plans?limit=N` - published dispatch plans
//! - `GET /dr-events`, `GET /dr-events/{id}` - DR event history
//! - `POST /dr-events` - register a DR notification
//! - `GET /summary?hours=N` - report summary over a trailing window

mod handlers;
mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::dispatch::engine::DispatchEngine;

pub use types::{ErrorResponse, LimitQuery, StatusResponse, SummaryQuery};

/// Application state shared across all request handlers.
///
/// The engine synchronizes its own histories, so handlers read it directly
/// while the control loop keeps ticking.
#[derive(Debug)]
pub struct AppState {
    pub engine: Arc<DispatchEngine>,
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(handlers::get_status))
        .route("/measurements", get(handlers::get_measurements))
        .route("/plans", get(handlers::get_plans))
        .route("/plans/latest", get(handlers::get_latest_plan))
        .route(
            "/dr-events",
            get(handlers::get_dr_events).post(handlers::post_dr_event),
        )
        .route("/dr-events/{id}", get(handlers::get_dr_event))
        .route("/summary", get(handlers::get_summary))
        .with_state(state)
}

/// Binds to `addr` and serves the API until the server exits.
///
/// # Errors
///
/// Returns an I/O error if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
