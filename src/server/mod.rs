mod handlers;
mod state;

use axum::routing::{get, post};
use axum::Router;
use state::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::cascade::CascadeHandle;

/// JSON facade over one shared cascade session.
pub fn build_router(cascade: CascadeHandle) -> Router {
    let state = Arc::new(AppState { cascade });

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/cascade", get(handlers::cascade))
        .route("/api/cascade/{level}", post(handlers::select))
        .route("/api/cascade/retry/{level}", post(handlers::retry))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(host: &str, port: u16, cascade: CascadeHandle) -> std::io::Result<()> {
    let app = build_router(cascade);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("location cascade listening on http://{}", addr);
    axum::serve(listener, app).await
}
