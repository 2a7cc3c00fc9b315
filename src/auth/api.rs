//! Authentication API Endpoints
//! Mission: Provide register, login and identity endpoints

use crate::auth::{
    jwt::TokenService,
    middleware::extract_identity,
    models::{AuthenticatedUser, LoginRequest, RegisterRequest, TokenResponse},
    service::AuthService,
};
use crate::error::ApiError;
use axum::{
    body::to_bytes,
    extract::Request,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

/// Request bodies larger than this are refused before parsing
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub auth: AuthService,
    pub tokens: Arc<TokenService>,
}

impl AuthState {
    pub fn new(auth: AuthService, tokens: Arc<TokenService>) -> Self {
        Self { auth, tokens }
    }
}

/// Parse and validate a JSON body. Oversized bodies are 413, anything else
/// unusable is a validation error.
async fn validated_body<T>(req: Request) -> Result<T, ApiError>
where
    T: DeserializeOwned + Validate,
{
    // Validate request size
    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok());
    if declared.is_some_and(|size| size > MAX_BODY_BYTES) {
        return Err(ApiError::PayloadTooLarge);
    }

    // Undeclared bodies are cut off at the same limit while streaming
    let bytes = to_bytes(req.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::PayloadTooLarge)?;

    let payload: T = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::Validation(format!("invalid JSON body: {e}")))?;

    payload
        .validate()
        .map_err(|e| ApiError::Validation(first_violation(&e)))?;

    Ok(payload)
}

/// First field message from a validation report, stable across runs
fn first_violation(errors: &validator::ValidationErrors) -> String {
    let field_errors = errors.field_errors();
    let mut fields: Vec<_> = field_errors.iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    fields
        .into_iter()
        .find_map(|(field, errs)| {
            errs.first().map(|e| match &e.message {
                Some(message) => message.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .unwrap_or_else(|| "invalid request".to_string())
}

/// Register endpoint - POST /auth/register
pub async fn register(state: AuthState, req: Request) -> Result<Json<TokenResponse>, ApiError> {
    let payload: RegisterRequest = validated_body(req).await?;

    let id = state
        .auth
        .register(&payload.email, &payload.password, &payload.name)
        .await?;

    let token = state
        .tokens
        .issue(&state.tokens.claims_for(&id, &payload.email))?;

    info!(user_id = %id, "Issued token after registration");
    Ok(Json(TokenResponse { token }))
}

/// Login endpoint - POST /auth/login
pub async fn login(state: AuthState, req: Request) -> Result<Json<TokenResponse>, ApiError> {
    let payload: LoginRequest = validated_body(req).await?;

    let identity = state.auth.login(&payload.email, &payload.password).await?;

    let token = state
        .tokens
        .issue(&state.tokens.claims_for(&identity.id, &identity.email))?;

    Ok(Json(TokenResponse { token }))
}

/// Get current user info - GET /auth/me
/// Answers from the verified token alone, no store lookup
pub async fn me(req: Request) -> Result<Json<AuthenticatedUser>, ApiError> {
    match extract_identity(&req) {
        Some(user) => Ok(Json(user.clone())),
        None => {
            // Only reachable when the route is mounted without the guard
            warn!("Identity missing on protected route");
            Err(ApiError::Unauthorized)
        }
    }
}

/// Health check - GET /health
pub async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}
