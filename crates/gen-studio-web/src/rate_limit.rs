//! Per-client sliding-window rate limiter.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests as usize,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<IpAddr, VecDeque<Instant>>> {
        self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a request from `client` and report whether it is within the limit.
    /// Rejected requests are not recorded.
    pub fn check(&self, client: IpAddr) -> bool {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: IpAddr, now: Instant) -> bool {
        let mut clients = self.clients();
        let history = clients.entry(client).or_default();
        while history
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= self.window)
        {
            history.pop_front();
        }
        if history.len() >= self.max_requests {
            return false;
        }
        history.push_back(now);
        true
    }

    /// Drop timestamps older than `retention` and forget idle clients.
    /// Returns how many clients were forgotten.
    pub fn sweep_at(&self, now: Instant, retention: Duration) -> usize {
        let mut clients = self.clients();
        let before = clients.len();
        clients.retain(|_, history| {
            history.retain(|t| now.saturating_duration_since(*t) < retention);
            !history.is_empty()
        });
        before - clients.len()
    }

    #[cfg(test)]
    pub(crate) fn tracked_clients(&self) -> usize {
        self.clients().len()
    }
}
