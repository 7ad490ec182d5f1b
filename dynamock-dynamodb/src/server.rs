//! DynamoDB HTTP service

use axum::{routing::post, Router};
use std::sync::Arc;

use crate::handlers::{handle_request, DynamoDBState};
use crate::storage::DynamoDBStorage;

/// Router answering DynamoDB JSON requests at `/`
pub fn router(storage: Arc<DynamoDBStorage>) -> Router {
    Router::new()
        .route("/", post(handle_request))
        .with_state(Arc::new(DynamoDBState { storage }))
}
