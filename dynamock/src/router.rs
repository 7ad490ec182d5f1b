//! HTTP router for the dynamock server

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use dynamock_dynamodb::{server, DynamoDBStorage};

/// Create the main application router
pub fn create_router(storage: Arc<DynamoDBStorage>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(server::router(storage))
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, r#"{"status": "running", "services": ["dynamodb"]}"#)
}
