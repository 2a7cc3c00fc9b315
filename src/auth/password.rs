//! Password Hashing
//! Mission: One-way, salted, adaptive-cost credential hashing (bcrypt)

use bcrypt::{hash, verify, DEFAULT_COST};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// bcrypt refuses costs below this.
pub const MIN_COST: u32 = 4;

/// Hashing failed for a reason unrelated to the password itself
/// (entropy source or resource exhaustion).
#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct HashingError(#[from] bcrypt::BcryptError);

/// Password hasher with a fixed cost factor
///
/// Hash strings are self-describing (`$2b$<cost>$<salt+digest>`), so
/// verification always uses the parameters embedded in the stored hash, not
/// the hasher's current cost.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
    decoy_hash: String,
}

impl PasswordHasher {
    /// Create a hasher. Computes one decoy hash up front at the same cost so
    /// that "no such account" can be made as expensive as "wrong password".
    pub fn new(cost: u32) -> Result<Self, HashingError> {
        let cost = cost.max(MIN_COST);
        let decoy_hash = hash(Uuid::new_v4().to_string(), cost)?;
        Ok(Self { cost, decoy_hash })
    }

    pub fn with_default_cost() -> Result<Self, HashingError> {
        Self::new(DEFAULT_COST)
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a plaintext password with a fresh random salt.
    pub fn hash(&self, plaintext: &str) -> Result<String, HashingError> {
        Ok(hash(plaintext, self.cost)?)
    }

    /// Check a plaintext password against a stored hash.
    ///
    /// A mismatch and an unparseable hash both return `false`.
    pub fn verify(&self, hash_string: &str, plaintext: &str) -> bool {
        match verify(plaintext, hash_string) {
            Ok(valid) => valid,
            Err(e) => {
                debug!(error = %e, "stored password hash could not be checked");
                false
            }
        }
    }

    /// Burn one verification worth of CPU against the decoy hash. Always false.
    pub fn verify_decoy(&self, plaintext: &str) -> bool {
        let _ = verify(plaintext, &self.decoy_hash);
        false
    }
}
