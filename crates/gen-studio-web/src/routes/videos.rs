// Video file route handler

use std::convert::Infallible;
use std::io::ErrorKind;

use gen_studio_types::VideoFormat;
use hyper::header::{HeaderValue, ACCEPT_RANGES, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Body, Response, StatusCode};
use log::error;

use crate::request::extract_path_param;
use crate::response_helpers::json_detail;
use crate::state::AppState;

/// `GET /videos/<filename>`: serve a previously generated video.
pub async fn handle(path: &str, state: &AppState) -> Result<Response<Body>, Infallible> {
    let raw = extract_path_param(path, "/videos/").unwrap_or_default();
    let filename = match urlencoding::decode(raw) {
        Ok(name) => name.into_owned(),
        Err(_) => return Ok(json_detail(StatusCode::BAD_REQUEST, "Invalid filename")),
    };
    let Some(file_path) = state.service.encoder().video_path(&filename) else {
        return Ok(json_detail(StatusCode::BAD_REQUEST, "Invalid filename"));
    };

    match tokio::fs::read(&file_path).await {
        Ok(bytes) => {
            let mime = filename
                .rsplit('.')
                .next()
                .and_then(VideoFormat::from_extension)
                .map_or("application/octet-stream", VideoFormat::mime_type);

            let mut response = Response::new(Body::from(bytes));
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(mime));
            headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=3600"));
            Ok(response)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Ok(json_detail(StatusCode::NOT_FOUND, "Video not found"))
        }
        Err(e) => {
            error!(target: "web", "Error streaming video {filename}: {e}");
            state.stats.record_error();
            Ok(json_detail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to stream video"))
        }
    }
}
