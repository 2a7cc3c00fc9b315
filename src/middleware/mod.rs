//! Request interceptors.
//!
//! This module provides:
//! - Ordered composition of interceptors around a handler
//! - Cross-origin headers and preflight answers
//! - Request logging with latency tracking
//! - Rate limiting per client address

pub mod chain;
pub mod cors;
pub mod logging;
pub mod rate_limit;

pub use chain::{compose, handler_fn, Handler, Interceptor, Next, Pipeline};
pub use cors::CorsInterceptor;
pub use logging::AccessLogInterceptor;
pub use rate_limit::{RateLimitConfig, RateLimitInterceptor, RateLimiter};
