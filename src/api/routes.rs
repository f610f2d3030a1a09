use crate::api::{handlers, AppState};
use crate::config::ServerConfig;
use crate::metrics::track_http;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main API router
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        // Health and scraping
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        // Model workflows
        .route("/api/v1/train", post(handlers::train_model))
        .route("/api/v1/predict", post(handlers::predict))
        .route("/api/v1/models", get(handlers::list_models))
        .route("/api/v1/models/:model_id", get(handlers::get_model))
        // Fleet views
        .route("/api/v1/assets", get(handlers::list_assets))
        .route("/api/v1/assets/:asset_id", get(handlers::get_asset))
        .route_layer(middleware::from_fn(track_http))
        // Add state
        .with_state(state)
        // Add middleware
        .layer(DefaultBodyLimit::max(server.max_upload_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false))
                .on_response(DefaultOnResponse::new().include_headers(false)),
        )
        .layer(CorsLayer::permissive())
}
