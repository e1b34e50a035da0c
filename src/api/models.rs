use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

use crate::protocol::ModelSlot;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct SlotEntry<'a> {
    id: ModelSlot,
    model: &'a str,
    default: bool,
}

#[derive(Debug, Serialize)]
struct SlotList<'a> {
    object: &'static str,
    data: Vec<SlotEntry<'a>>,
}

/// List the selectable slots and the upstream model each maps to.
pub fn handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let default_slot = state.model_map.default_slot();
    let list = SlotList {
        object: "list",
        data: state
            .model_map
            .entries()
            .map(|(slot, model)| SlotEntry {
                id: slot,
                model,
                default: slot == default_slot,
            })
            .collect(),
    };
    match serde_json::to_value(&list) {
        Ok(body) => Json(body),
        Err(err) => {
            tracing::error!("failed to encode slot list: {err}");
            Json(serde_json::json!({ "object": "list", "data": [] }))
        }
    }
}
