//! Argon2id password hashing.
//!
//! Hashing and verification are CPU-bound; the async helpers move them onto the
//! blocking pool so they never stall the runtime.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        self, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
        rand_core::OsRng,
    },
};
use thiserror::Error;
use tokio::task;

use crate::config::PasswordConfig;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Invalid hashing parameters: {0}")]
    Params(String),

    #[error("Failed to hash password")]
    Hash,

    #[error("Stored password hash is malformed")]
    MalformedDigest,

    #[error("Password verification failed: {0}")]
    Verify(String),

    #[error("Hashing task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone)]
pub struct Hasher {
    params: Params,
}

impl Hasher {
    pub fn new(config: &PasswordConfig) -> Result<Self, HashError> {
        let params = Params::new(config.memory_cost_kib, config.cost, config.parallelism, None)
            .map_err(|e| HashError::Params(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Produces a salted PHC string for `password`.
    pub fn hash(&self, password: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| HashError::Hash)
    }

    /// Checks `password` against a stored digest.
    ///
    /// The digest carries its own parameters, so hashes made with older
    /// settings still verify. A mismatch is `Ok(false)`; only an unusable
    /// digest is an error.
    pub fn verify(&self, password: &str, digest: &str) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(digest).map_err(|_| HashError::MalformedDigest)?;

        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(HashError::Verify(e.to_string())),
        }
    }

    /// True when `digest` was produced with different parameters or algorithm.
    #[must_use]
    pub fn needs_rehash(&self, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return true;
        };

        if parsed.algorithm != Algorithm::Argon2id.ident() {
            return true;
        }

        Params::try_from(&parsed).map_or(true, |stored| {
            stored.m_cost() != self.params.m_cost()
                || stored.t_cost() != self.params.t_cost()
                || stored.p_cost() != self.params.p_cost()
        })
    }

    pub async fn hash_blocking(&self, password: &str) -> Result<String, HashError> {
        let hasher = self.clone();
        let password = password.to_string();
        task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| HashError::Task(e.to_string()))?
    }

    pub async fn verify_blocking(&self, password: &str, digest: &str) -> Result<bool, HashError> {
        let hasher = self.clone();
        let password = password.to_string();
        let digest = digest.to_string();
        task::spawn_blocking(move || hasher.verify(&password, &digest))
            .await
            .map_err(|e| HashError::Task(e.to_string()))?
    }
}
