// Model management route handlers

use std::convert::Infallible;

use gen_studio_engine::query_free_vram_mb;
use gen_studio_types::ModelKind;
use hyper::{Body, Request, Response, StatusCode};
use log::info;
use serde::Deserialize;
use serde_json::json;

use crate::request::parse_json;
use crate::response_helpers::{json_detail, json_message, json_response};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct LoadRequest {
    model_type: String,
    #[serde(default)]
    force_reload: bool,
}

#[derive(Debug, Deserialize)]
struct UnloadRequest {
    model_type: String,
}

fn parse_kind(raw: &str) -> Result<ModelKind, Response<Body>> {
    raw.parse::<ModelKind>()
        .map_err(|e| json_detail(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()))
}

pub async fn handle_load(req: Request<Body>, state: &AppState) -> Result<Response<Body>, Infallible> {
    let request: LoadRequest = match parse_json(req).await {
        Ok(request) => request,
        Err(response) => return Ok(response),
    };
    let kind = match parse_kind(&request.model_type) {
        Ok(kind) => kind,
        Err(response) => return Ok(response),
    };

    info!(target: "web", "Loading model: {kind}");
    let outcome = state.service.manager().load(kind, request.force_reload).await;
    if !outcome.loaded {
        state.stats.record_error();
    }
    Ok(json_response(StatusCode::OK, &outcome))
}

pub async fn handle_unload(req: Request<Body>, state: &AppState) -> Result<Response<Body>, Infallible> {
    let request: UnloadRequest = match parse_json(req).await {
        Ok(request) => request,
        Err(response) => return Ok(response),
    };
    let kind = match parse_kind(&request.model_type) {
        Ok(kind) => kind,
        Err(response) => return Ok(response),
    };

    info!(target: "web", "Unloading model: {kind}");
    if state.service.manager().unload(kind).await {
        Ok(json_message(true, &format!("Model {kind} unloaded successfully")))
    } else {
        state.stats.record_error();
        Ok(json_message(false, &format!("Failed to unload model {kind}")))
    }
}

pub async fn handle_clear_all(state: &AppState) -> Result<Response<Body>, Infallible> {
    info!(target: "web", "Force clearing all models and device memory");
    let outcome = state.service.manager().clear_all().await;
    let message = if outcome.success {
        "ALL models cleared successfully".to_string()
    } else {
        state.stats.record_error();
        format!("Error clearing models: {}", outcome.reclaim.errors.join("; "))
    };
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "success": outcome.success,
            "message": message,
            "processing_time": outcome.processing_time,
            "unloaded": outcome.unloaded,
            "reclaim": outcome.reclaim,
        }),
    ))
}

pub async fn handle_status(state: &AppState) -> Result<Response<Body>, Infallible> {
    let manager = state.service.manager();
    let accountant = manager.accountant();
    let free_vram_mb = tokio::task::spawn_blocking(query_free_vram_mb)
        .await
        .ok()
        .flatten();

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "data": manager.status(),
            "total_memory_mb": manager.total_memory_mb(),
            "device": {
                "name": accountant.device_name(),
                "allocated_mb": accountant.allocated_mb(),
                "reserved_mb": accountant.reserved_mb(),
                "peak_allocated_mb": accountant.peak_allocated_mb(),
                "free_vram_mb": free_vram_mb,
            },
        }),
    ))
}
