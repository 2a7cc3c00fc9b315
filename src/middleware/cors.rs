//! Cross-origin policy.
//!
//! Runs first in every chain so OPTIONS requests, preflight or not, are
//! answered before any guard that could reject them.

use crate::middleware::chain::{Interceptor, Next};
use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};

const ALLOW_METHODS: &str = "GET, POST, PATCH, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, Content-Length";
const MAX_AGE_SECS: &str = "86400";

/// Reflects the request origin back when it is allowed.
#[derive(Debug, Clone, Default)]
pub struct CorsInterceptor {
    /// Empty means any origin is reflected.
    allowed_origins: Vec<String>,
}

impl CorsInterceptor {
    pub fn new(allowed_origins: Vec<String>) -> Self {
        Self { allowed_origins }
    }

    pub fn permissive() -> Self {
        Self::default()
    }

    fn is_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == origin)
    }

    fn apply(headers: &mut HeaderMap, origin: HeaderValue) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }
}

#[async_trait]
impl Interceptor for CorsInterceptor {
    async fn intercept(&self, req: Request, next: Next) -> Response {
        let origin = match req.headers().get(header::ORIGIN) {
            Some(origin) => origin.clone(),
            // Bare OPTIONS is answered here too so it never reaches a handler
            None if req.method() == Method::OPTIONS => {
                let mut response = StatusCode::NO_CONTENT.into_response();
                response
                    .headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static(ALLOW_METHODS));
                return response;
            }
            None => return next.run(req).await,
        };

        let allowed = origin.to_str().map(|o| self.is_allowed(o)).unwrap_or(false);

        if req.method() == Method::OPTIONS {
            let mut response = StatusCode::NO_CONTENT.into_response();
            if allowed {
                let headers = response.headers_mut();
                Self::apply(headers, origin);
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static(ALLOW_METHODS),
                );
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static(ALLOW_HEADERS),
                );
                headers.insert(
                    header::ACCESS_CONTROL_MAX_AGE,
                    HeaderValue::from_static(MAX_AGE_SECS),
                );
            }
            return response;
        }

        let mut response = next.run(req).await;
        if allowed {
            Self::apply(response.headers_mut(), origin);
        }
        response
    }

    fn name(&self) -> &'static str {
        "cors"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::chain::{compose, handler_fn, Pipeline};
    use axum::{body::Body, http::Request as HttpRequest};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn pipeline(cors: CorsInterceptor, hits: Arc<AtomicUsize>) -> Pipeline {
        compose(
            vec![Arc::new(cors) as Arc<dyn Interceptor>],
            handler_fn(move |_req| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::OK.into_response()
                }
            }),
        )
    }

    fn request(method: Method, origin: Option<&str>) -> Request {
        let mut builder = HttpRequest::builder().method(method).uri("/auth/login");
        if let Some(origin) = origin {
            builder = builder.header(header::ORIGIN, origin);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_no_origin_passes_through_untouched() {
        let hits = Arc::new(AtomicUsize::new(0));
        let response = pipeline(CorsInterceptor::permissive(), hits.clone())
            .handle(request(Method::GET, None))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_origin_reflected_on_simple_request() {
        let hits = Arc::new(AtomicUsize::new(0));
        let response = pipeline(CorsInterceptor::permissive(), hits.clone())
            .handle(request(Method::POST, Some("https://app.example.com")))
            .await;

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_preflight_answered_without_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let response = pipeline(CorsInterceptor::permissive(), hits.clone())
            .handle(request(Method::OPTIONS, Some("https://app.example.com")))
            .await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            ALLOW_METHODS
        );
        assert_eq!(response.headers()[header::ACCESS_CONTROL_MAX_AGE], "86400");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bare_options_answered_without_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let response = pipeline(CorsInterceptor::permissive(), hits.clone())
            .handle(request(Method::OPTIONS, None))
            .await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[header::ALLOW], ALLOW_METHODS);
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disallowed_origin_gets_no_headers() {
        let hits = Arc::new(AtomicUsize::new(0));
        let cors = CorsInterceptor::new(vec!["https://app.example.com".to_string()]);
        let response = pipeline(cors, hits.clone())
            .handle(request(Method::GET, Some("https://evil.example.net")))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }
}
