use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;

/// Liveness plus the number of loaded resources.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "resources": state.engine.resource_count(),
    }))
}
