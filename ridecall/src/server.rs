//! HTTP server: the WebSocket signaling endpoint plus liveness and stats.

use anyhow::Result;
use axum::{extract::State, routing::get, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use ridecall_core::Config;
use ridecall_signaling::{ws, AppState};

pub async fn run(config: &Config, state: AppState) -> Result<()> {
    let app = Router::new()
        .route("/ws", get(ws::websocket_handler))
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = config.http_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "registry": state.registry.stats(),
        "rooms": state.hub.room_count(),
        "connections": state.hub.connection_count(),
    }))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received, draining");
}
