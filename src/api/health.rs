use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "chat-relay is running",
        "config": {
            "upstream_dialect": state.upstream.dialect(),
            "upstream_auth": config.upstream.api_key.is_some(),
            "model_slots_count": state.model_map.len(),
            "default_slot": state.model_map.default_slot(),
            "features": {
                "log_level": config.features.log_level,
            }
        }
    }))
}
