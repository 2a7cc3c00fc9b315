//! Rate limiting middleware.
//!
//! Token bucket per client key. Buckets live in a sharded map; refill,
//! decrement and removal of one key all happen under that key's shard lock,
//! so callers for keys on different shards never wait on each other.

use crate::error::ApiError;
use crate::middleware::chain::{Interceptor, Next};
use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Configuration for rate limiting.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Sustained refill rate, tokens per second.
    pub rate_per_second: f64,
    /// Bucket capacity; also the size of an initial burst.
    pub burst: u32,
    /// Idle time after which a bucket may be forgotten.
    pub ttl: Duration,
    /// Advisory backoff sent with every rejection.
    pub retry_after: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_per_second: 1.0,
            burst: 5,
            ttl: Duration::from_secs(3600),
            retry_after: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
struct RateBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Per-key token bucket limiter.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<DashMap<String, RateBucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit or reject one request from `key`.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).is_allowed()
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    /// Admission check against an explicit clock reading.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let burst = f64::from(self.config.burst);

        // Entry guard holds the shard write lock until dropped
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| RateBucket {
                tokens: burst,
                last_refill: now,
            });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.config.rate_per_second)
            .min(burst);
        bucket.last_refill = bucket.last_refill.max(now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateLimitDecision::Allowed {
                remaining: bucket.tokens.floor() as u32,
            }
        } else {
            RateLimitDecision::Limited {
                retry_after: self.config.retry_after,
            }
        }
    }

    /// Drop buckets idle for longer than the TTL. Returns how many were removed.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    /// Two passes keep write locks short. The scan holds one shard's read
    /// lock at a time, so a `check_at` on that shard waits at most for one
    /// shard's scan. Removal then takes the write lock for one key at a time
    /// and re-checks idleness, so a bucket refreshed after the scan survives.
    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let ttl = self.config.ttl;
        let is_idle = |bucket: &RateBucket| now.saturating_duration_since(bucket.last_refill) > ttl;

        let stale: Vec<String> = self
            .buckets
            .iter()
            .filter(|entry| is_idle(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        stale
            .into_iter()
            .filter(|key| self.buckets.remove_if(key, |_, bucket| is_idle(bucket)).is_some())
            .count()
    }

    /// Number of tracked buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Periodically evict idle buckets in the background, keeping eviction
    /// off the request path.
    pub fn spawn_janitor(&self, every: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = limiter.evict_idle();
                if evicted > 0 {
                    debug!(evicted, remaining = limiter.len(), "Evicted idle rate buckets");
                }
            }
        })
    }
}

/// Client identity for rate limiting: first non-empty of `X-Forwarded-For`
/// (last hop), `X-Real-IP`, then the peer address.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|hop| !hop.is_empty())
                .last()
        });

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Key for a request, reading the peer address from `ConnectInfo` if the
/// server recorded one.
pub fn request_client_key(req: &Request) -> String {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_key(req.headers(), peer)
}

/// Interceptor that rejects over-limit clients with 429.
#[derive(Clone)]
pub struct RateLimitInterceptor {
    limiter: RateLimiter,
}

impl RateLimitInterceptor {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Interceptor for RateLimitInterceptor {
    async fn intercept(&self, req: Request, next: Next) -> Response {
        let key = request_client_key(&req);

        match self.limiter.check(&key) {
            RateLimitDecision::Allowed { .. } => next.run(req).await,
            RateLimitDecision::Limited { retry_after } => {
                warn!(
                    client = %key,
                    path = %req.uri().path(),
                    retry_after_secs = retry_after.as_secs(),
                    "Rate limit exceeded"
                );
                ApiError::RateLimited { retry_after }.into_response()
            }
        }
    }

    fn name(&self) -> &'static str {
        "rate_limit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn limiter(rate_per_second: f64, burst: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            rate_per_second,
            burst,
            ttl: Duration::from_secs(60),
            retry_after: Duration::from_secs(60),
        })
    }

    #[test]
    fn test_burst_then_reject_then_refill() {
        let limiter = limiter(1.0, 3);
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("10.0.0.1", start).is_allowed());
        }
        assert_eq!(
            limiter.check_at("10.0.0.1", start),
            RateLimitDecision::Limited {
                retry_after: Duration::from_secs(60)
            }
        );

        let later = start + Duration::from_secs(1);
        assert!(limiter.check_at("10.0.0.1", later).is_allowed());
        assert!(!limiter.check_at("10.0.0.1", later).is_allowed());
    }

    #[test]
    fn test_rejection_does_not_consume() {
        let limiter = limiter(1.0, 1);
        let start = Instant::now();

        assert!(limiter.check_at("k", start).is_allowed());
        for _ in 0..5 {
            assert!(!limiter.check_at("k", start + Duration::from_millis(100)).is_allowed());
        }
        // Only 1s of refill is needed despite the rejections
        assert!(limiter.check_at("k", start + Duration::from_secs(1)).is_allowed());
    }

    #[test]
    fn test_refill_capped_at_burst() {
        let limiter = limiter(10.0, 2);
        let start = Instant::now();
        assert!(limiter.check_at("k", start).is_allowed());

        let much_later = start + Duration::from_secs(30);
        assert_eq!(
            limiter.check_at("k", much_later),
            RateLimitDecision::Allowed { remaining: 1 }
        );
        assert!(limiter.check_at("k", much_later).is_allowed());
        assert!(!limiter.check_at("k", much_later).is_allowed());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter(1.0, 2);
        let now = Instant::now();

        assert!(limiter.check_at("a", now).is_allowed());
        assert!(limiter.check_at("a", now).is_allowed());
        assert!(!limiter.check_at("a", now).is_allowed());

        assert!(limiter.check_at("b", now).is_allowed());
        assert!(limiter.check_at("b", now).is_allowed());
    }

    #[test]
    fn test_idle_buckets_evicted() {
        let limiter = limiter(1.0, 1);
        let start = Instant::now();

        assert!(limiter.check_at("idle", start).is_allowed());
        assert!(limiter.check_at("busy", start + Duration::from_secs(50)).is_allowed());

        let evicted = limiter.evict_idle_at(start + Duration::from_secs(61));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.len(), 1);

        // An evicted key starts over with a full bucket
        assert!(limiter
            .check_at("idle", start + Duration::from_secs(61))
            .is_allowed());
    }

    #[test]
    fn test_eviction_spares_buckets_at_ttl_boundary() {
        let limiter = limiter(1.0, 1);
        let start = Instant::now();

        assert!(limiter.check_at("edge", start).is_allowed());
        assert!(limiter.check_at("stale", start).is_allowed());
        assert!(limiter
            .check_at("edge", start + Duration::from_secs(1))
            .is_allowed());

        // ttl is 60s: "edge" was last touched exactly 60s before the sweep
        let evicted = limiter.evict_idle_at(start + Duration::from_secs(61));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.len(), 1);
        assert_eq!(limiter.evict_idle_at(start + Duration::from_secs(61)), 0);
    }

    #[test]
    fn test_concurrent_same_key_never_over_admits() {
        let limiter = limiter(0.0, 100);
        let now = Instant::now();

        let admitted: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let limiter = &limiter;
                    s.spawn(move || {
                        (0..50)
                            .filter(|_| limiter.check_at("shared", now).is_allowed())
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(admitted, 100);
    }

    #[test]
    fn test_client_key_priority() {
        let peer: SocketAddr = "192.168.1.9:5555".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers, Some(peer)), "192.168.1.9");
        assert_eq!(client_key(&headers, None), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_key(&headers, Some(peer)), "10.0.0.2");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.3"),
        );
        assert_eq!(client_key(&headers, Some(peer)), "10.0.0.3");

        headers.insert("x-forwarded-for", HeaderValue::from_static("  "));
        assert_eq!(client_key(&headers, Some(peer)), "10.0.0.2");
    }

    #[tokio::test]
    async fn test_janitor_evicts_in_background() {
        let limiter = RateLimiter::new(RateLimitConfig {
            ttl: Duration::from_millis(10),
            ..RateLimitConfig::default()
        });
        assert!(limiter.allow("k"));
        assert_eq!(limiter.len(), 1);

        let janitor = limiter.spawn_janitor(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(limiter.is_empty());
        janitor.abort();
    }
}
