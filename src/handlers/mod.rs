use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::engine::{OrderCreateRequest, OrderEngine};
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "boxoffice-api",
    };

    success(payload, "Health check successful").into_response()
}

/// `POST /api/events/{event_id}/orders`
///
/// The engine is synchronous and holds the event lock for the whole
/// validate-then-commit span, so it runs on the blocking pool.
pub async fn create_order(
    State(engine): State<Arc<OrderEngine>>,
    Path(event_id): Path<Uuid>,
    Json(req): Json<OrderCreateRequest>,
) -> Result<Response, AppError> {
    let simulate = req.simulate;
    let outcome = tokio::task::spawn_blocking(move || engine.create_order(event_id, req))
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))??;

    if simulate {
        Ok(success(outcome, "Order simulated").into_response())
    } else {
        Ok(created(outcome, "Order created").into_response())
    }
}
