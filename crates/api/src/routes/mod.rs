//! HTTP routes

pub mod certificates;
pub mod checkout;

#[cfg(test)]
mod route_tests;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/certificates/check", get(certificates::check_certificate))
        .route(
            "/api/certificates/convert",
            post(certificates::convert_certificate),
        )
        .route("/api/checkout", post(checkout::create_checkout))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
