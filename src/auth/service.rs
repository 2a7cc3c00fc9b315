//! Authentication Service
//! Mission: Register and log in accounts against an injected credential store

use crate::auth::{
    models::{Credential, Identity, NewCredential},
    password::{HashingError, PasswordHasher},
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Failures surfaced by a credential store
#[derive(Debug, Error)]
pub enum StoreError {
    /// A credential with this email already exists
    #[error("credential already exists")]
    UniqueViolation,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Storage capability the auth service needs. Implementations must enforce
/// email uniqueness and report collisions as [`StoreError::UniqueViolation`].
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_credential_by_email(&self, email: &str)
        -> Result<Option<Credential>, StoreError>;

    /// Persist a credential and return its generated id
    async fn create_credential(&self, credential: NewCredential) -> Result<String, StoreError>;
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user already exists")]
    AlreadyExists,
    /// Wrong password and unknown account alike
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Hashing(#[from] HashingError),
    #[error("credential store failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation => AuthError::AlreadyExists,
            StoreError::Backend(e) => AuthError::Storage(e),
        }
    }
}

/// Register/login orchestration
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<PasswordHasher>,
}

impl AuthService {
    pub fn new(store: Arc<dyn CredentialStore>, hasher: Arc<PasswordHasher>) -> Self {
        Self { store, hasher }
    }

    /// Create an account and return its id
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<String, AuthError> {
        if self.store.find_credential_by_email(email).await?.is_some() {
            warn!("Registration refused, email already taken");
            return Err(AuthError::AlreadyExists);
        }

        let hasher = self.hasher.clone();
        let plaintext = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| AuthError::Storage(anyhow::anyhow!("hashing task failed: {e}")))??;

        // The store's unique constraint settles races between check and insert
        let id = self
            .store
            .create_credential(NewCredential {
                email: email.to_string(),
                name: name.to_string(),
                password_hash,
            })
            .await?;

        info!(user_id = %id, "Registered new account");
        Ok(id)
    }

    /// Check an email/password pair. Unknown emails and wrong passwords give
    /// the same error after the same amount of bcrypt work.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let credential = self.store.find_credential_by_email(email).await?;

        let hasher = self.hasher.clone();
        let plaintext = password.to_string();
        let stored_hash = credential.as_ref().map(|c| c.password_hash.clone());
        let valid = tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => hasher.verify(&hash, &plaintext),
            None => hasher.verify_decoy(&plaintext),
        })
        .await
        .map_err(|e| AuthError::Storage(anyhow::anyhow!("verification task failed: {e}")))?;

        match credential {
            Some(credential) if valid => {
                info!(user_id = %credential.id, "Login successful");
                Ok(Identity::from(&credential))
            }
            _ => {
                warn!("Failed login attempt");
                Err(AuthError::InvalidCredentials)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::MIN_COST;
    use crate::auth::user_store::InMemoryCredentialStore;

    fn service_with(store: Arc<dyn CredentialStore>) -> AuthService {
        AuthService::new(store, Arc::new(PasswordHasher::new(MIN_COST).unwrap()))
    }

    fn service() -> AuthService {
        service_with(Arc::new(InMemoryCredentialStore::new()))
    }

    /// Store whose lookup never sees existing rows, so only the insert's
    /// unique constraint can catch a duplicate
    struct RacingStore;

    #[async_trait]
    impl CredentialStore for RacingStore {
        async fn find_credential_by_email(
            &self,
            _email: &str,
        ) -> Result<Option<Credential>, StoreError> {
            Ok(None)
        }

        async fn create_credential(&self, _credential: NewCredential) -> Result<String, StoreError> {
            Err(StoreError::UniqueViolation)
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl CredentialStore for BrokenStore {
        async fn find_credential_by_email(
            &self,
            _email: &str,
        ) -> Result<Option<Credential>, StoreError> {
            Err(StoreError::Backend(anyhow::anyhow!("connection reset")))
        }

        async fn create_credential(&self, _credential: NewCredential) -> Result<String, StoreError> {
            Err(StoreError::Backend(anyhow::anyhow!("connection reset")))
        }
    }

    #[tokio::test]
    async fn test_register_then_duplicate() {
        let service = service();

        let id = service
            .register("a@example.com", "longenoughpw", "Ann")
            .await
            .unwrap();
        assert!(!id.is_empty());

        let again = service
            .register("a@example.com", "longenoughpw", "Ann")
            .await;
        assert!(matches!(again, Err(AuthError::AlreadyExists)));
    }

    #[tokio::test]
    async fn test_register_stores_hash_not_plaintext() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let service = service_with(store.clone());

        service
            .register("a@example.com", "longenoughpw", "Ann")
            .await
            .unwrap();

        let stored = store
            .find_credential_by_email("a@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stored.password_hash, "longenoughpw");
        assert_eq!(stored.name, "Ann");
    }

    #[tokio::test]
    async fn test_unique_violation_becomes_already_exists() {
        let service = service_with(Arc::new(RacingStore));
        let result = service
            .register("a@example.com", "longenoughpw", "Ann")
            .await;
        assert!(matches!(result, Err(AuthError::AlreadyExists)));
    }

    #[tokio::test]
    async fn test_login_success_returns_identity() {
        let service = service();
        let id = service
            .register("a@example.com", "longenoughpw", "Ann")
            .await
            .unwrap();

        let identity = service.login("a@example.com", "longenoughpw").await.unwrap();
        assert_eq!(identity.id, id);
        assert_eq!(identity.email, "a@example.com");
    }

    #[tokio::test]
    async fn test_login_wrong_password_and_unknown_user_look_alike() {
        let service = service();
        service
            .register("a@example.com", "longenoughpw", "Ann")
            .await
            .unwrap();

        let wrong = service.login("a@example.com", "wrong").await;
        let unknown = service.login("unknown@x.com", "anything").await;

        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_store_failure_is_storage_error() {
        let service = service_with(Arc::new(BrokenStore));

        let login = service.login("a@example.com", "longenoughpw").await;
        assert!(matches!(login, Err(AuthError::Storage(_))));

        let register = service
            .register("a@example.com", "longenoughpw", "Ann")
            .await;
        assert!(matches!(register, Err(AuthError::Storage(_))));
    }
}
