use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a summary of the upstream settings.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "dragon-gateway is running",
        "upstream": state.upstream.base_url(),
        "credential_configured": state.upstream.has_credentials(),
        "models": {
            "allowed": state.models.allowed_sorted(),
            "fallback": state.models.fallback(),
        }
    }))
}
