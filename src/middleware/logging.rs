//! Request logging middleware.
//!
//! Logs every HTTP request with method, path, client, status code, and latency.

use crate::middleware::chain::{Interceptor, Next};
use crate::middleware::rate_limit::request_client_key;
use async_trait::async_trait;
use axum::{extract::Request, response::Response};
use std::time::Instant;
use tracing::{info, warn, Instrument};

/// Interceptor that logs HTTP requests with timing information.
///
/// Logs at INFO level for successful and 4xx requests, WARN level for 5xx.
#[derive(Debug, Clone, Default)]
pub struct AccessLogInterceptor;

impl AccessLogInterceptor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Interceptor for AccessLogInterceptor {
    async fn intercept(&self, req: Request, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        // Skip logging for health checks to reduce noise
        if path == "/health" {
            return next.run(req).await;
        }

        let client = request_client_key(&req);
        let start = Instant::now();

        let span = tracing::info_span!(
            "http_request",
            method = %method,
            path = %path,
            client = %client,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        );

        let response = next.run(req).instrument(span.clone()).await;

        let latency = start.elapsed();
        let status = response.status().as_u16();

        span.record("status", status);
        span.record("latency_ms", latency.as_millis() as u64);

        let _entered = span.enter();
        if status >= 500 {
            warn!(
                method = %method,
                path = %path,
                status = status,
                latency_ms = latency.as_millis() as u64,
                client = %client,
                "Request failed (5xx)"
            );
        } else if status >= 400 {
            info!(
                method = %method,
                path = %path,
                status = status,
                latency_ms = latency.as_millis() as u64,
                client = %client,
                "Request completed (4xx)"
            );
        } else {
            info!(
                method = %method,
                path = %path,
                status = status,
                latency_ms = latency.as_millis() as u64,
                "Request completed"
            );
        }

        response
    }

    fn name(&self) -> &'static str {
        "access_log"
    }
}
