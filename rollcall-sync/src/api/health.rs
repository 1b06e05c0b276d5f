//! Health endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde_json::json;

use crate::AppState;

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let uptime_secs = (chrono::Utc::now() - state.startup_time).num_seconds();
    Json(json!({
        "status": "ok",
        "uptime_secs": uptime_secs,
        "identities": state.index.len().await,
    }))
}
