// Generation route handlers

use std::convert::Infallible;

use gen_studio_types::{
    ArtParams, Artifact, GenerationRequest, ModelKind, StreamingParams, VideoParams,
};
use hyper::{Body, Request, Response, StatusCode};
use log::{info, warn};
use serde_json::{json, Value};

use crate::request::parse_json;
use crate::response_helpers::{json_detail, json_response};
use crate::state::AppState;

async fn parse_request(req: Request<Body>, kind: ModelKind) -> Result<GenerationRequest, Response<Body>> {
    match kind {
        ModelKind::Art => parse_json::<ArtParams>(req).await.map(GenerationRequest::Art),
        ModelKind::Video => parse_json::<VideoParams>(req).await.map(GenerationRequest::Video),
        ModelKind::Streaming => parse_json::<StreamingParams>(req)
            .await
            .map(GenerationRequest::Streaming),
    }
}

/// `POST /generate-art`, `/generate-video` and `/generate-streaming`.
///
/// Malformed or out-of-range requests are a 422. Generation failures are a
/// 200 with `success=false`, matching the rest of the API.
pub async fn handle(
    req: Request<Body>,
    state: &AppState,
    kind: ModelKind,
) -> Result<Response<Body>, Infallible> {
    state.stats.record_generation(kind);

    let request = match parse_request(req, kind).await {
        Ok(request) => request,
        Err(response) => {
            state.stats.record_error();
            return Ok(response);
        }
    };
    if let Err(e) = request.validate() {
        warn!(target: "web", "Rejected {kind} request: {e}");
        state.stats.record_error();
        return Ok(json_detail(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()));
    }

    let result = state.service.generate(request).await;
    if !result.success {
        state.stats.record_error();
    }

    let mut body = match serde_json::to_value(&result) {
        Ok(body) => body,
        Err(e) => {
            state.stats.record_error();
            return Ok(json_detail(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("{kind} generation failed: {e}"),
            ));
        }
    };
    if let (Some(Artifact::Video { video_filename, .. }), Value::Object(map)) =
        (&result.artifact, &mut body)
    {
        map.insert("video_url".to_string(), json!(format!("/videos/{video_filename}")));
        info!(target: "web", "Video generated in {:.2}s", result.processing_time);
    }
    Ok(json_response(StatusCode::OK, &body))
}
