// Process-scoped server state shared by every request handler

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gen_studio_config::ServerConfig;
use gen_studio_engine::SharedGenerativeService;
use gen_studio_types::ModelKind;
use serde::Serialize;

use crate::rate_limit::RateLimiter;

pub type SharedAppState = Arc<AppState>;

#[derive(Debug, Default)]
pub struct RequestStats {
    request_count: AtomicU64,
    generative_art_requests: AtomicU64,
    generative_video_requests: AtomicU64,
    streaming_generative_requests: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub request_count: u64,
    pub generative_art_requests: u64,
    pub generative_video_requests: u64,
    pub streaming_generative_requests: u64,
    pub errors: u64,
}

impl RequestStats {
    pub fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_generation(&self, kind: ModelKind) {
        let counter = match kind {
            ModelKind::Art => &self.generative_art_requests,
            ModelKind::Video => &self.generative_video_requests,
            ModelKind::Streaming => &self.streaming_generative_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            request_count: self.request_count.load(Ordering::Relaxed),
            generative_art_requests: self.generative_art_requests.load(Ordering::Relaxed),
            generative_video_requests: self.generative_video_requests.load(Ordering::Relaxed),
            streaming_generative_requests: self
                .streaming_generative_requests
                .load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

pub struct AppState {
    pub config: ServerConfig,
    pub service: SharedGenerativeService,
    pub limiter: RateLimiter,
    pub stats: RequestStats,
    started: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, service: SharedGenerativeService) -> Self {
        let limiter = RateLimiter::new(
            config.max_requests_per_minute,
            Duration::from_secs(config.rate_limit_window_secs),
        );
        Self {
            config,
            service,
            limiter,
            stats: RequestStats::default(),
            started: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_counters() {
        let stats = RequestStats::default();
        stats.record_request();
        stats.record_request();
        stats.record_generation(ModelKind::Video);
        stats.record_error();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.generative_video_requests, 1);
        assert_eq!(snapshot.generative_art_requests, 0);
        assert_eq!(snapshot.errors, 1);
    }
}
