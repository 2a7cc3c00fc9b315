//! Authentication Models
//! Mission: Define credential, claim and request/response structures

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Stored account credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub created_at: String,
}

/// Credential handed to the store at registration; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

/// Who a successful login resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub email: String,
}

impl From<&Credential> for Identity {
    fn from(credential: &Credential) -> Self {
        Self {
            id: credential.id.clone(),
            email: credential.email.clone(),
        }
    }
}

/// JWT Claims payload
///
/// Absent fields deserialize to defaults so that presence is judged by token
/// validation, which reports them as missing claims rather than bad JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Claims {
    pub sub: String, // subject (user id)
    pub email: String,
    pub iat: i64, // issued at, seconds since epoch
    pub exp: i64, // expiration, seconds since epoch
}

/// Identity bound into request extensions by the authentication guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    #[serde(rename = "id")]
    pub subject_id: String,
    pub email: String,
}

impl From<Claims> for AuthenticatedUser {
    fn from(claims: Claims) -> Self {
        Self {
            subject_id: claims.sub,
            email: claims.email,
        }
    }
}

/// Register request body
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(
        email(message = "email is invalid"),
        length(min = 10, message = "email must be at least 10 characters")
    )]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

/// Login request body
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(
        email(message = "email is invalid"),
        length(min = 10, message = "email must be at least 10 characters")
    )]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

/// Token response for both register and login
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_never_serialized() {
        let credential = Credential {
            id: "u1".to_string(),
            email: "ann@example.com".to_string(),
            name: "Ann".to_string(),
            password_hash: "$2b$04$secret".to_string(),
            created_at: "2025-01-01T00:00:00Z".to_string(),
        };

        let json = serde_json::to_string(&credential).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("$2b$04$secret"));
    }

    #[test]
    fn test_register_request_validation() {
        let ok = RegisterRequest {
            name: "Ann".to_string(),
            email: "a@example.com".to_string(),
            password: "longenoughpw".to_string(),
        };
        assert!(ok.validate().is_ok());

        let bad_email = RegisterRequest {
            email: "invalid".to_string(),
            ..ok
        };
        assert!(bad_email.validate().is_err());
    }

    #[test]
    fn test_login_request_short_password_rejected() {
        let req = LoginRequest {
            email: "a@example.com".to_string(),
            password: "short".to_string(),
        };
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password"));
    }

    #[test]
    fn test_authenticated_user_from_claims() {
        let claims = Claims {
            sub: "user-1".to_string(),
            email: "a@example.com".to_string(),
            iat: 1,
            exp: 2,
        };
        let user = AuthenticatedUser::from(claims);
        assert_eq!(user.subject_id, "user-1");
        assert_eq!(
            serde_json::to_value(&user).unwrap(),
            serde_json::json!({"id": "user-1", "email": "a@example.com"})
        );
    }
}
