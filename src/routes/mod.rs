use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::engine::OrderEngine;
use crate::handlers::{create_order, health_check};

pub fn create_routes(engine: Arc<OrderEngine>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/events/:event_id/orders", post(create_order))
        .layer(create_security_headers_layer())
        .layer(create_cors_layer())
        .with_state(engine)
}
