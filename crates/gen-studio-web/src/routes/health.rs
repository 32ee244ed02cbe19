// Service info and health check route handlers

use std::convert::Infallible;

use chrono::Local;
use hyper::{Body, Response, StatusCode};
use serde_json::json;

use crate::response_helpers::json_response;
use crate::state::AppState;

pub async fn handle_root(state: &AppState) -> Result<Response<Body>, Infallible> {
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "service": "Gen Studio API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Generate art, video and streaming content",
            "endpoints": {
                "health": "/health",
                "generate-art": "/generate-art",
                "generate-video": "/generate-video",
                "generate-streaming": "/generate-streaming",
                "models-status": "/models/status",
            },
            "uptime_seconds": state.uptime_seconds(),
            "service_stats": state.stats.snapshot(),
        }),
    ))
}

pub async fn handle_health(state: &AppState) -> Result<Response<Body>, Infallible> {
    let loaded = state
        .service
        .manager()
        .status()
        .values()
        .filter(|s| s.state == gen_studio_types::SlotState::Loaded)
        .count();
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "message": "Gen Studio server is healthy",
            "timestamp": Local::now().to_rfc3339(),
            "uptime_seconds": state.uptime_seconds(),
            "loaded_models": loaded,
        }),
    ))
}
