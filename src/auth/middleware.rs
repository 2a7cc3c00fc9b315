//! Authentication Middleware
//! Mission: Protect routes with bearer token validation

use crate::auth::{
    jwt::{TokenError, TokenService},
    models::AuthenticatedUser,
};
use crate::error::ApiError;
use crate::middleware::chain::{Interceptor, Next};
use async_trait::async_trait;
use axum::{
    extract::Request,
    http::header,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Interceptor that admits only requests carrying a valid bearer token
#[derive(Clone)]
pub struct AuthenticationGuard {
    tokens: Arc<TokenService>,
}

impl AuthenticationGuard {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

/// Token from `Authorization: Bearer <token>`, if the header is well formed
fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl Interceptor for AuthenticationGuard {
    async fn intercept(&self, mut req: Request, next: Next) -> Response {
        let Some(token) = bearer_token(&req) else {
            debug!(path = %req.uri().path(), "Missing or malformed bearer token");
            return ApiError::Unauthorized.into_response();
        };

        let claims = match self.tokens.verify(token) {
            Ok(claims) => claims,
            Err(err) => {
                // The kind is for operators only; the client sees a plain 401
                match err {
                    TokenError::BadSignature => {
                        warn!(path = %req.uri().path(), reason = %err, "Token rejected")
                    }
                    _ => debug!(path = %req.uri().path(), reason = %err, "Token rejected"),
                }
                return ApiError::Unauthorized.into_response();
            }
        };

        req.extensions_mut().insert(AuthenticatedUser::from(claims));
        next.run(req).await
    }

    fn name(&self) -> &'static str {
        "authentication"
    }
}

/// Extract the authenticated identity from request (use behind the guard)
pub fn extract_identity(req: &Request) -> Option<&AuthenticatedUser> {
    req.extensions().get::<AuthenticatedUser>()
}
