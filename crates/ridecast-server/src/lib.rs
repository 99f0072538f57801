//! # Ridecast server
//!
//! HTTP endpoints for the ride-hailing apps plus, in local broker mode, the
//! WebSocket endpoint their realtime subscribers connect to.
//!
//! ```text
//! POST /api/rides ──▶ validate ──▶ envelope ──▶ relay (best effort) ──▶ dispatch ──▶ broker
//!                                                                                   │
//!                                                           GET /ws ◀── subscribers ◀┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod relay;
pub mod state;
pub mod validation;
pub mod ws;

pub use config::Config;
pub use error::ApiError;
pub use state::AppState;

use anyhow::Result;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// The full HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .nest("/api", api::routes())
        .route("/health", get(health_handler));

    if state.local.is_some() {
        router = router.route(&state.config.websocket_path, get(ws::ws_handler));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the state cannot be assembled or the server fails to
/// start.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let websocket_path = config.websocket_path.clone();
    let state = Arc::new(AppState::from_config(config)?);
    let serves_subscribers = state.local.is_some();

    let listener = TcpListener::bind(addr).await?;
    info!("Ridecast server listening on {}", addr);
    if serves_subscribers {
        info!("WebSocket endpoint: ws://{}{}", addr, websocket_path);
    }

    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
