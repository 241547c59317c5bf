use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

use crate::state::{AppState, ContextSummary};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn list_contexts(State(state): State<Arc<AppState>>) -> Json<Vec<ContextSummary>> {
    Json(state.contexts().await)
}
