//! Per-client fixed-window rate limiting.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::error::GatewayError;
use crate::observability::metrics;

/// Request counter for one client within one window.
#[derive(Debug, Clone, Copy)]
struct RateBucket {
    window_start: Instant,
    count: u32,
}

impl RateBucket {
    fn expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the client's window resets.
    pub reset_after: Duration,
}

/// Fixed-window limiter keyed by client IP.
///
/// Check-and-increment runs under the bucket's shard lock, so concurrent
/// requests from one client cannot both slip under the limit.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<IpAddr, RateBucket>,
    limit: u32,
    window: Duration,
    max_clients: usize,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration, max_clients: usize) -> Self {
        Self {
            buckets: DashMap::new(),
            limit,
            window,
            max_clients: max_clients.max(1),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.max_requests,
            Duration::from_millis(config.window_ms),
            config.max_clients,
        )
    }

    pub fn admit(&self, client: IpAddr) -> Admission {
        self.admit_at(client, Instant::now())
    }

    /// Count one request from `client` at `now`.
    pub fn admit_at(&self, client: IpAddr, now: Instant) -> Admission {
        if !self.buckets.contains_key(&client) && self.buckets.len() >= self.max_clients {
            self.evict(now);
        }

        let mut bucket = self.buckets.entry(client).or_insert(RateBucket {
            window_start: now,
            count: 0,
        });
        if bucket.expired(now, self.window) {
            bucket.window_start = now;
            bucket.count = 0;
        }
        bucket.count = bucket.count.saturating_add(1);

        let elapsed = now.saturating_duration_since(bucket.window_start);
        Admission {
            allowed: bucket.count <= self.limit,
            limit: self.limit,
            remaining: self.limit.saturating_sub(bucket.count),
            reset_after: self.window.saturating_sub(elapsed),
        }
    }

    /// Drop expired buckets; if still at capacity, drop the oldest window.
    fn evict(&self, now: Instant) {
        self.buckets.retain(|_, bucket| !bucket.expired(now, self.window));
        if self.buckets.len() < self.max_clients {
            return;
        }

        let oldest = self
            .buckets
            .iter()
            .min_by_key(|entry| entry.value().window_start)
            .map(|entry| *entry.key());
        if let Some(client) = oldest {
            self.buckets.remove(&client);
            tracing::debug!(client = %client, "Evicted rate limit bucket at capacity");
        }
    }

    /// Number of tracked clients.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

fn set_rate_limit_headers(headers: &mut HeaderMap, admission: &Admission) {
    let values = [
        ("ratelimit-limit", admission.limit as u64),
        ("ratelimit-remaining", admission.remaining as u64),
        ("ratelimit-reset", admission.reset_after.as_secs()),
    ];
    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
            headers.insert(name, value);
        }
    }
}

/// Admission stage: runs before any routing decision.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let admission = limiter.admit(addr.ip());

    let mut response = if admission.allowed {
        next.run(request).await
    } else {
        tracing::warn!(client = %addr.ip(), path = %request.uri().path(), "Rate limit exceeded");
        metrics::record_rate_limited();
        GatewayError::RateLimitExceeded {
            retry_after: admission.reset_after,
        }
        .into_response()
    };

    set_rate_limit_headers(response.headers_mut(), &admission);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::thread;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn fourth_request_in_window_is_rejected() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), 100);
        let start = Instant::now();

        let outcomes: Vec<bool> = (0..4)
            .map(|i| limiter.admit_at(ip(1), start + Duration::from_millis(i * 10)).allowed)
            .collect();
        assert_eq!(outcomes, vec![true, true, true, false]);

        // other clients have their own budget
        assert!(limiter.admit_at(ip(2), start).allowed);
    }

    #[test]
    fn window_expiry_restarts_count() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), 100);
        let start = Instant::now();
        for _ in 0..4 {
            limiter.admit_at(ip(1), start);
        }

        let later = limiter.admit_at(ip(1), start + Duration::from_secs(61));
        assert!(later.allowed);
        assert_eq!(later.remaining, 2, "count restarts at 1");
        assert_eq!(later.reset_after, Duration::from_secs(60));
    }

    #[test]
    fn reports_remaining_and_reset() {
        let limiter = RateLimiter::new(5, Duration::from_secs(100), 100);
        let start = Instant::now();
        limiter.admit_at(ip(1), start);
        let second = limiter.admit_at(ip(1), start + Duration::from_secs(40));
        assert_eq!(second.remaining, 3);
        assert_eq!(second.reset_after, Duration::from_secs(60));
    }

    #[test]
    fn bucket_count_is_bounded() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60), 3);
        let start = Instant::now();
        for i in 0..3u8 {
            limiter.admit_at(ip(i), start + Duration::from_secs(i as u64));
        }
        assert_eq!(limiter.tracked_clients(), 3);

        // at capacity with nothing expired: the oldest window goes
        limiter.admit_at(ip(50), start + Duration::from_secs(5));
        assert_eq!(limiter.tracked_clients(), 3);
        assert!(!limiter.buckets.contains_key(&ip(0)));

        // expired buckets are cleared first
        limiter.admit_at(ip(51), start + Duration::from_secs(120));
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn concurrent_requests_never_exceed_limit() {
        let limiter = Arc::new(RateLimiter::new(50, Duration::from_secs(60), 100));
        let start = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                thread::spawn(move || {
                    (0..25).filter(|_| limiter.admit_at(ip(9), start).allowed).count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[test]
    fn headers_are_set() {
        let mut headers = HeaderMap::new();
        set_rate_limit_headers(
            &mut headers,
            &Admission {
                allowed: true,
                limit: 100,
                remaining: 99,
                reset_after: Duration::from_secs(900),
            },
        );
        assert_eq!(headers["ratelimit-limit"], "100");
        assert_eq!(headers["ratelimit-remaining"], "99");
        assert_eq!(headers["ratelimit-reset"], "900");
    }
}
