// HTTP response helper functions shared by the route handlers

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Response, StatusCode};
use serde::Serialize;

const CORS_METHODS: &str = "GET, POST, OPTIONS";
const CORS_HEADERS: &str = "content-type, authorization";

/// Build a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_string(body) {
        Ok(json) => json_raw(status, json),
        Err(e) => json_detail(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Serialization failed: {e}"),
        ),
    }
}

/// Build an error response in the `{"detail": "..."}` shape
pub fn json_detail(status: StatusCode, message: &str) -> Response<Body> {
    json_raw(status, serde_json::json!({ "detail": message }).to_string())
}

/// Build a `{"success": .., "message": ..}` response
pub fn json_message(success: bool, message: &str) -> Response<Body> {
    json_raw(
        StatusCode::OK,
        serde_json::json!({ "success": success, "message": message }).to_string(),
    )
}

/// Build a raw JSON string response
pub fn json_raw(status: StatusCode, json: String) -> Response<Body> {
    let mut response = Response::new(Body::from(json));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Build an empty response
pub fn empty_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// CORS preflight response
pub fn cors_preflight() -> Response<Body> {
    empty_response(StatusCode::OK)
}

/// Attach CORS headers when the request origin is allowed.
///
/// A `*` entry in `allowed` admits every origin.
pub fn with_cors(mut response: Response<Body>, origin: Option<&str>, allowed: &[String]) -> Response<Body> {
    let Some(origin) = origin else {
        return response;
    };
    let wildcard = allowed.iter().any(|o| o == "*");
    if !wildcard && !allowed.iter().any(|o| o == origin) {
        return response;
    }
    let allow_origin = if wildcard { "*" } else { origin };
    if let Ok(value) = HeaderValue::from_str(allow_origin) {
        let headers = response.headers_mut();
        headers.insert("access-control-allow-origin", value);
        headers.insert("access-control-allow-methods", HeaderValue::from_static(CORS_METHODS));
        headers.insert("access-control-allow-headers", HeaderValue::from_static(CORS_HEADERS));
        if !wildcard {
            headers.insert("access-control-allow-credentials", HeaderValue::from_static("true"));
            headers.insert("vary", HeaderValue::from_static("Origin"));
        }
    }
    response
}
