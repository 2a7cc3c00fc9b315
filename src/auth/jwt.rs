//! JWT Token Handler
//! Mission: Issue and verify stateless HS256 bearer tokens

use crate::auth::models::Claims;
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;
use tracing::debug;

/// Why a token was refused. Callers must not expose the variant to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not verify")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is missing a required claim")]
    MissingRequiredClaim,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::MissingRequiredClaim(_) => TokenError::MissingRequiredClaim,
            _ => TokenError::Malformed,
        }
    }
}

/// Issues and verifies tokens with a single symmetric secret
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl TokenService {
    /// Create a token service with a secret and a token lifetime
    pub fn new(secret: &str, lifetime: std::time::Duration) -> Result<Self> {
        let lifetime = Duration::from_std(lifetime).context("Token lifetime out of range")?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["sub", "exp"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            lifetime,
        })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Claims for a subject, issued now and expiring after the configured lifetime
    pub fn claims_for(&self, subject_id: &str, email: &str) -> Claims {
        let iat = Utc::now().timestamp();
        Claims {
            sub: subject_id.to_string(),
            email: email.to_string(),
            iat,
            exp: iat + self.lifetime.num_seconds(),
        }
    }

    /// Sign a claim set into a compact token
    pub fn issue(&self, claims: &Claims) -> Result<String> {
        debug!(
            "Issuing token for subject {}, expires at {}",
            claims.sub, claims.exp
        );

        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .context("Failed to sign token")
    }

    /// Verify a token and return its claims.
    ///
    /// Structure is checked before the signature, and the signature before
    /// expiry, so garbage never costs an HMAC. The HMAC comparison itself is
    /// constant-time.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        if token.split('.').count() != 3 {
            return Err(TokenError::Malformed);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims;

        // jsonwebtoken cannot require iat; an absent one decodes as 0
        if claims.sub.trim().is_empty() || claims.email.trim().is_empty() || claims.iat <= 0 {
            return Err(TokenError::MissingRequiredClaim);
        }
        // jsonwebtoken treats exp == now as still valid
        if Utc::now().timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}
