use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::AppState;

use super::handlers;

/// Run the axum control surface on `bind_addr`: get/put layout, set
/// brightness/pattern/schedule/power ceiling, read status, list pattern
/// names.
pub async fn run(state: Arc<AppState>, bind_addr: String) {
    let app = Router::new()
        .route("/api/layout", get(handlers::get_layout).put(handlers::put_layout))
        .route("/api/brightness", post(handlers::set_brightness))
        .route("/api/pattern", get(handlers::get_pattern).post(handlers::set_pattern))
        .route("/api/patterns", get(handlers::list_patterns))
        .route("/api/schedule", post(handlers::set_schedule))
        .route("/api/power", post(handlers::set_power))
        .route("/api/status", get(handlers::get_status))
        .route("/api/healthz", get(handlers::healthz))
        .layer(RequestBodyLimitLayer::new(65536)) // 64KB max request body
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(5)))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => {
            info!("[WEB] Control surface listening on http://{}", bind_addr);
            l
        }
        Err(e) => {
            tracing::error!("[WEB] Failed to bind {}: {}", bind_addr, e);
            return;
        }
    };

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .ok();

    info!("[WEB] Control surface stopped");
}
