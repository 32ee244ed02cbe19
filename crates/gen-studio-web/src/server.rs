// HTTP server: routing, rate limiting, request logging

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use gen_studio_types::ModelKind;
use hyper::header::ORIGIN;
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use log::{debug, info, warn};

use crate::request::host_allowed;
use crate::response_helpers::{cors_preflight, json_detail, with_cors};
use crate::routes::{generate, health, models, videos};
use crate::state::{AppState, SharedAppState};

/// Entry point for every connection's requests.
pub async fn handle_request(
    req: Request<Body>,
    remote: SocketAddr,
    state: SharedAppState,
) -> Result<Response<Body>, Infallible> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let origin = req
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    state.stats.record_request();
    info!(target: "web", "{method} {path}");

    let response = if !host_allowed(&req, &state.config.allowed_hosts) {
        warn!(target: "web", "Rejected {method} {path} from {remote}: untrusted Host header");
        json_detail(StatusCode::BAD_REQUEST, "Invalid host header")
    } else if method != Method::OPTIONS && !state.limiter.check(remote.ip()) {
        json_detail(
            StatusCode::TOO_MANY_REQUESTS,
            &format!(
                "Rate limit exceeded. Maximum {} requests per minute.",
                state.limiter.max_requests()
            ),
        )
    } else {
        route(req, &state).await?
    };

    if response.status().is_server_error() {
        state.stats.record_error();
    }
    info!(
        target: "web",
        "{method} {path} - {} - {:.3}s",
        response.status().as_u16(),
        started.elapsed().as_secs_f64()
    );
    Ok(with_cors(response, origin.as_deref(), &state.config.allowed_origins))
}

async fn route(req: Request<Body>, state: &AppState) -> Result<Response<Body>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/") => health::handle_root(state).await,
        (&Method::GET, "/health") => health::handle_health(state).await,

        (&Method::POST, "/generate-art") => generate::handle(req, state, ModelKind::Art).await,
        (&Method::POST, "/generate-video") => generate::handle(req, state, ModelKind::Video).await,
        (&Method::POST, "/generate-streaming") => {
            generate::handle(req, state, ModelKind::Streaming).await
        }

        (&Method::POST, "/models/load") => models::handle_load(req, state).await,
        (&Method::POST, "/models/unload") => models::handle_unload(req, state).await,
        (&Method::POST, "/models/clear-all") => models::handle_clear_all(state).await,
        (&Method::GET, "/models/status") => models::handle_status(state).await,

        (&Method::GET, path) if path.starts_with("/videos/") => {
            let path = path.to_string();
            videos::handle(&path, state).await
        }

        (&Method::OPTIONS, _) => Ok(cors_preflight()),

        _ => Ok(json_detail(StatusCode::NOT_FOUND, "Not Found")),
    }
}

/// Periodically forget clients that have been idle for a whole sweep interval.
async fn rate_limit_sweeper(state: SharedAppState) {
    let every = Duration::from_secs(state.config.rate_limit_sweep_secs.max(1));
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let removed = state.limiter.sweep_at(Instant::now(), every);
        if removed > 0 {
            debug!(target: "web", "Rate limiter forgot {removed} idle client(s)");
        }
    }
}

/// Serve until Ctrl-C.
pub async fn run(addr: SocketAddr, state: SharedAppState) -> Result<(), hyper::Error> {
    tokio::spawn(rate_limit_sweeper(state.clone()));

    let make_svc = make_service_fn({
        let state = state.clone();
        move |conn: &AddrStream| {
            let remote = conn.remote_addr();
            let state = state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    handle_request(req, remote, state.clone())
                }))
            }
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    info!(target: "web", "Gen Studio server listening on http://{addr}");
    info!(target: "web", "Available endpoints:");
    info!(target: "web", "  GET  /health               - Health check");
    info!(target: "web", "  POST /generate-art         - Generate an image");
    info!(target: "web", "  POST /generate-video       - Generate a video");
    info!(target: "web", "  POST /generate-streaming   - Fast image generation");
    info!(target: "web", "  POST /models/load          - Load a model");
    info!(target: "web", "  POST /models/unload        - Unload a model");
    info!(target: "web", "  POST /models/clear-all     - Unload everything, reset device");
    info!(target: "web", "  GET  /models/status        - Model status");
    info!(target: "web", "  GET  /videos/<filename>    - Download a generated video");

    server
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!(target: "web", "Shutting down");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::path::PathBuf;
    use std::sync::Arc;

    use gen_studio_config::{BackendConfig, ModelProfile, ServerConfig};
    use gen_studio_engine::{
        ArtifactEncoder, GenerativeService, GifWriter, ModelLifecycleManager, ResourceAccountant,
        SimulatedDevice, SyntheticBackend,
    };
    use serde_json::Value;

    struct TestServer {
        state: SharedAppState,
        video_dir: PathBuf,
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.video_dir).ok();
        }
    }

    fn test_server(max_requests_per_minute: u32) -> TestServer {
        let profile = |memory_mb| ModelProfile {
            memory_mb,
            load_delay_ms: 0,
            step_delay_ms: 0,
        };
        let video_dir =
            std::env::temp_dir().join(format!("gen_studio_web_{}", uuid::Uuid::new_v4().simple()));
        let config = ServerConfig {
            max_requests_per_minute,
            video_dir: video_dir.clone(),
            backend: BackendConfig {
                art: profile(10),
                video: profile(20),
                streaming: profile(30),
            },
            ..ServerConfig::default()
        };

        let device = SimulatedDevice::new();
        let backend = Arc::new(SyntheticBackend::new(device.clone(), config.backend.clone()));
        let accountant = Arc::new(ResourceAccountant::new(device));
        let manager = Arc::new(ModelLifecycleManager::new(backend, accountant));
        let encoder = Arc::new(ArtifactEncoder::new(&video_dir, config.video_fps, Box::new(GifWriter)));
        let service = Arc::new(GenerativeService::new(manager, encoder));
        TestServer {
            state: Arc::new(AppState::new(config, service)),
            video_dir,
        }
    }

    const CLIENT: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000);

    async fn send(server: &TestServer, method: Method, path: &str, body: Option<&str>) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost:8000")
            .header("origin", "http://localhost:5173")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = handle_request(req, CLIENT, server.state.clone()).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let server = test_server(30);
        let (status, root) = send(&server, Method::GET, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(root["endpoints"]["health"], "/health");

        let (status, health) = send(&server, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["success"], true);
        assert_eq!(health["loaded_models"], 0);
    }

    #[tokio::test]
    async fn test_generate_art_lazy_loads() {
        let server = test_server(30);
        let (status, body) = send(
            &server,
            Method::POST,
            "/generate-art",
            Some(r#"{"prompt":"A fox","width":256,"height":256,"num_inference_steps":10}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true, "{body}");
        assert_eq!(body["model_used"], "prompthero/openjourney");
        assert!(body["image_base64"].as_str().is_some_and(|s| !s.is_empty()));

        let (_, status_body) = send(&server, Method::GET, "/models/status", None).await;
        assert_eq!(status_body["data"]["generative_art"]["state"], "loaded");
        assert_eq!(server.state.stats.snapshot().generative_art_requests, 1);
    }

    #[tokio::test]
    async fn test_out_of_range_request_is_422() {
        let server = test_server(30);
        let (status, body) = send(
            &server,
            Method::POST,
            "/generate-streaming",
            Some(r#"{"prompt":"city","num_inference_steps":9}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("num_inference_steps"));
        let status_report = server.state.service.manager().status();
        assert!(status_report.values().all(|s| s.memory_usage_mb == 0.0));
    }

    #[tokio::test]
    async fn test_video_round_trip_through_download() {
        let server = test_server(30);
        let (status, body) = send(
            &server,
            Method::POST,
            "/generate-video",
            Some(r#"{"prompt":"waves","num_frames":8,"num_inference_steps":1,"width":256,"height":256}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true, "{body}");
        let url = body["video_url"].as_str().unwrap().to_string();
        assert!(url.starts_with("/videos/video_"));

        let req = Request::get(url.as_str())
            .header("host", "127.0.0.1:8000")
            .body(Body::empty())
            .unwrap();
        let response = handle_request(req, CLIENT, server.state.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/gif");
    }

    #[tokio::test]
    async fn test_video_download_rejects_bad_names() {
        let server = test_server(30);
        let (status, _) = send(&server, Method::GET, "/videos/..%2Fsecret.mp4", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&server, Method::GET, "/videos/missing.mp4", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_model_management_routes() {
        let server = test_server(30);
        let (_, loaded) = send(
            &server,
            Method::POST,
            "/models/load",
            Some(r#"{"model_type":"generative_video"}"#),
        )
        .await;
        assert_eq!(loaded["loaded"], true);
        assert_eq!(loaded["memory_usage_mb"], 20.0);

        let (_, again) = send(
            &server,
            Method::POST,
            "/models/load",
            Some(r#"{"model_type":"generative_video"}"#),
        )
        .await;
        assert_eq!(again["already_loaded"], true);

        let (_, unloaded) = send(
            &server,
            Method::POST,
            "/models/unload",
            Some(r#"{"model_type":"generative_video"}"#),
        )
        .await;
        assert_eq!(unloaded["success"], true);

        let (_, cleared) = send(&server, Method::POST, "/models/clear-all", None).await;
        assert_eq!(cleared["success"], true);
        assert_eq!(cleared["message"], "ALL models cleared successfully");
    }

    #[tokio::test]
    async fn test_unknown_model_type_is_422() {
        let server = test_server(30);
        let (status, body) = send(
            &server,
            Method::POST,
            "/models/load",
            Some(r#"{"model_type":"llm"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("llm"));
    }

    #[tokio::test]
    async fn test_rate_limit_returns_429() {
        let server = test_server(2);
        assert_eq!(send(&server, Method::GET, "/health", None).await.0, StatusCode::OK);
        assert_eq!(send(&server, Method::GET, "/health", None).await.0, StatusCode::OK);
        let (status, body) = send(&server, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["detail"].as_str().unwrap().contains("Maximum 2"));
    }

    #[tokio::test]
    async fn test_cors_headers_and_unknown_route() {
        let server = test_server(30);
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/generate-art")
            .header("host", "localhost:8000")
            .header("origin", "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let response = handle_request(req, CLIENT, server.state.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:5173"
        );

        let (status, _) = send(&server, Method::GET, "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_untrusted_host_rejected_before_routing() {
        let server = test_server(1);
        let req = Request::get("/health")
            .header("host", "attacker.example")
            .body(Body::empty())
            .unwrap();
        let response = handle_request(req, CLIENT, server.state.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["detail"], "Invalid host header");

        // The rejected request did not use up the single allowed slot.
        let (status, _) = send(&server, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
