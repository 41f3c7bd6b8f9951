//! Health Route

use axum::{extract::State, Json};
use inference_engine::ModelState;
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub model: ModelHealth,
}

/// Model availability
#[derive(Debug, Serialize)]
pub struct ModelHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub class_names: Vec<String>,
}

/// Health check handler
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let model = match &state.model {
        ModelState::Ready(handle) => ModelHealth {
            status: "ready".to_string(),
            origin: Some(handle.origin().to_string()),
            reason: None,
            class_names: handle.class_names().iter().map(String::from).collect(),
        },
        ModelState::Unavailable { reason } => ModelHealth {
            status: "unavailable".to_string(),
            origin: None,
            reason: Some(reason.clone()),
            class_names: Vec::new(),
        },
    };

    let status = if state.model.is_ready() { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        model,
    })
}
