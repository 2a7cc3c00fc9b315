//! Credential Storage
//! Mission: Persist account credentials with a unique email constraint

use crate::auth::{
    models::{Credential, NewCredential},
    service::{CredentialStore, StoreError},
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, ErrorCode};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Credential store with SQLite backend
pub struct SqliteCredentialStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCredentialStore {
    /// Open (or create) the database at `db_path` and initialize the schema.
    /// `":memory:"` gives a private in-process database.
    pub fn new(db_path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open credential database at {db_path}"))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_db()?;
        info!("🔐 Credential store ready at: {}", db_path);
        Ok(store)
    }

    fn init_db(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create users table")?;
        Ok(())
    }

    fn find_blocking(conn: &Connection, email: &str) -> rusqlite::Result<Option<Credential>> {
        let mut stmt = conn.prepare(
            "SELECT id, email, name, password_hash, created_at
             FROM users WHERE email = ?1",
        )?;

        let result = stmt.query_row(params![email], |row| {
            Ok(Credential {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
                password_hash: row.get(3)?,
                created_at: row.get(4)?,
            })
        });

        match result {
            Ok(credential) => Ok(Some(credential)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn insert_blocking(conn: &Connection, credential: &Credential) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO users (id, email, name, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                credential.id,
                credential.email,
                credential.name,
                credential.password_hash,
                credential.created_at,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::UniqueViolation
            } else {
                StoreError::Backend(anyhow::Error::new(e).context("Failed to insert user"))
            }
        })?;
        Ok(())
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn find_credential_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Credential>, StoreError> {
        let conn = self.conn.clone();
        let email = email.to_string();
        tokio::task::spawn_blocking(move || Self::find_blocking(&conn.lock(), &email))
            .await
            .context("Credential lookup task failed")?
            .context("Failed to query user by email")
            .map_err(StoreError::Backend)
    }

    async fn create_credential(&self, new: NewCredential) -> Result<String, StoreError> {
        let credential = Credential {
            id: Uuid::new_v4().to_string(),
            email: new.email,
            name: new.name,
            password_hash: new.password_hash,
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            Self::insert_blocking(&conn.lock(), &credential)?;
            info!("✅ Created user: {}", credential.id);
            Ok::<_, StoreError>(credential.id)
        })
        .await
        .context("Credential insert task failed")?
    }
}

/// Credential store kept in process memory
#[derive(Default)]
pub struct InMemoryCredentialStore {
    by_email: RwLock<HashMap<String, Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_email.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_email.read().is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_credential_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Credential>, StoreError> {
        Ok(self.by_email.read().get(email).cloned())
    }

    async fn create_credential(&self, new: NewCredential) -> Result<String, StoreError> {
        let mut by_email = self.by_email.write();
        if by_email.contains_key(&new.email) {
            return Err(StoreError::UniqueViolation);
        }

        let id = Uuid::new_v4().to_string();
        by_email.insert(
            new.email.clone(),
            Credential {
                id: id.clone(),
                email: new.email,
                name: new.name,
                password_hash: new.password_hash,
                created_at: Utc::now().to_rfc3339(),
            },
        );
        Ok(id)
    }
}
