//! Per-client request throttling.
//!
//! Every (client address, tier) pair owns a bucket holding up to the tier's
//! per-window allowance. A request spends one token; tokens flow back
//! continuously so an idle client regains a full bucket after one window.
//! Credential endpoints use the smaller `Auth` allowance.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::ApiError;
use crate::config::RateLimitConfig;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// Catalog, attendee and organizer routes
    Api,
    /// Login, refresh and registration
    Auth,
}

impl RateLimitTier {
    fn label(self) -> &'static str {
        match self {
            RateLimitTier::Api => "api",
            RateLimitTier::Auth => "auth",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Outcome of charging one request to a client's bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed {
        limit: u32,
        remaining: u32,
        /// Seconds until the bucket is full again
        reset_after: u64,
    },
    Throttled {
        limit: u32,
        /// Seconds until one request will be accepted
        retry_after: u64,
    },
}

#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<(IpAddr, RateLimitTier), Bucket>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Requests allowed per window for a tier
    pub fn limit(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Api => self.config.api_requests_per_window,
            RateLimitTier::Auth => self.config.auth_requests_per_window,
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_seconds.max(1))
    }

    /// Tokens regained per second
    fn refill_rate(&self, tier: RateLimitTier) -> f64 {
        f64::from(self.limit(tier)) / self.window().as_secs_f64()
    }

    pub fn check(&self, ip: IpAddr, tier: RateLimitTier) -> Decision {
        self.check_at(ip, tier, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, tier: RateLimitTier, now: Instant) -> Decision {
        let limit = self.limit(tier);
        let capacity = f64::from(limit);
        let rate = self.refill_rate(tier);

        let mut bucket = self.buckets.entry((ip, tier)).or_insert(Bucket {
            tokens: capacity,
            refilled_at: now,
        });
        let idle = now.saturating_duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + idle * rate).min(capacity);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Decision::Allowed {
                limit,
                remaining: bucket.tokens.floor() as u32,
                reset_after: seconds_until(capacity - bucket.tokens, rate),
            }
        } else {
            let retry_after = if rate > 0.0 {
                seconds_until(1.0 - bucket.tokens, rate).max(1)
            } else {
                self.window().as_secs()
            };
            Decision::Throttled { limit, retry_after }
        }
    }

    /// Forget buckets idle for a full window; they would be full anyway
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    fn sweep_at(&self, now: Instant) {
        let window = self.window();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.refilled_at) < window);
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

fn seconds_until(tokens: f64, rate: f64) -> u64 {
    if tokens <= 0.0 || rate <= 0.0 {
        return 0;
    }
    (tokens / rate).ceil() as u64
}

/// Address of the hop that sent us the request. Forwarding headers are
/// written by clients unless a proxy overwrites them, so they are read only
/// when `trust_proxy_headers` is set, and then only the entry the proxy
/// appended last.
fn client_ip(request: &Request<Body>, trust_proxy_headers: bool) -> IpAddr {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(request.headers()) {
            return ip;
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    header("x-forwarded-for")
        .and_then(|chain| chain.rsplit(',').next())
        .and_then(|ip| ip.trim().parse().ok())
        .or_else(|| header("x-real-ip").and_then(|ip| ip.trim().parse().ok()))
}

pub async fn rate_limit_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    enforce(&state, request, next, RateLimitTier::Api).await
}

pub async fn rate_limit_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    enforce(&state, request, next, RateLimitTier::Auth).await
}

async fn enforce(state: &AppState, request: Request<Body>, next: Next, tier: RateLimitTier) -> Response {
    let limiter = &state.rate_limiter;
    if !limiter.enabled() {
        return next.run(request).await;
    }

    let ip = client_ip(&request, state.config.rate_limit.trust_proxy_headers);
    match limiter.check(ip, tier) {
        Decision::Allowed {
            limit,
            remaining,
            reset_after,
        } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
            headers.insert("X-RateLimit-Reset", HeaderValue::from(reset_after));
            response
        }
        Decision::Throttled { limit, retry_after } => {
            tracing::warn!(%ip, tier = tier.label(), retry_after, "Request throttled");
            let mut response = ApiError::rate_limited(format!(
                "Too many requests. Try again in {} seconds.",
                retry_after
            ))
            .into_response();
            let headers = response.headers_mut();
            headers.insert("Retry-After", HeaderValue::from(retry_after));
            headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u32));
            response
        }
    }
}

/// Periodically drop idle buckets
pub fn spawn_cleanup_task(limiter: Arc<RateLimiter>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            limiter.sweep();
            tracing::debug!(buckets = limiter.len(), "Rate limiter swept");
        }
    });
}
