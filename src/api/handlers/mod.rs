//! Request handlers

pub mod generate;
pub mod generations;
pub mod user;

use axum::Json;

use crate::api::types::HealthResponse;

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
