// Request parsing utilities for HTTP requests

use hyper::header::HOST;
use hyper::{Body, Request, Response, StatusCode};
use log::warn;
use serde::de::DeserializeOwned;

use crate::response_helpers::json_detail;

/// Parse request body as JSON.
///
/// An unreadable body is a 400; a body that does not match `T` is a 422.
pub async fn parse_json<T: DeserializeOwned>(req: Request<Body>) -> Result<T, Response<Body>> {
    let body_bytes = match hyper::body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(target: "web", "Failed to read request body: {e}");
            return Err(json_detail(StatusCode::BAD_REQUEST, "Failed to read request body"));
        }
    };

    serde_json::from_slice(&body_bytes).map_err(|e| {
        warn!(target: "web", "JSON parsing error: {e}");
        json_detail(StatusCode::UNPROCESSABLE_ENTITY, &format!("Invalid request body: {e}"))
    })
}

/// Extract path parameter from URI path
/// Example: extract_path_param("/videos/video_1.mp4", "/videos/") => Some("video_1.mp4")
pub fn extract_path_param<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    path.strip_prefix(prefix).filter(|rest| !rest.is_empty())
}

/// Hostname of a `Host` header value, without port or IPv6 brackets.
fn host_name(value: &str) -> &str {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    value.split(':').next().unwrap_or(value)
}

/// Whether the request's `Host` header names one of `allowed`.
///
/// `*` admits any host. A request without a readable `Host` header is rejected.
pub fn host_allowed(req: &Request<Body>, allowed: &[String]) -> bool {
    if allowed.iter().any(|h| h == "*") {
        return true;
    }
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host());
    match host {
        Some(host) => {
            let name = host_name(host);
            allowed.iter().any(|h| h.eq_ignore_ascii_case(name))
        }
        None => false,
    }
}
