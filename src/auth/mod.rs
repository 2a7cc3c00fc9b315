//! Authentication Module
//! Mission: Credential checks, bearer tokens and the route guard

pub mod api;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod service;
pub mod user_store;

pub use api::AuthState;
pub use jwt::{TokenError, TokenService};
pub use middleware::{extract_identity, AuthenticationGuard};
pub use password::PasswordHasher;
pub use service::{AuthError, AuthService, CredentialStore, StoreError};
pub use user_store::{InMemoryCredentialStore, SqliteCredentialStore};
