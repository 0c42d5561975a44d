//! One-way salted secret hashing for local credentials.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use thiserror::Error;

/// Argon2id hasher used for every non-third-party credential secret.
///
/// Hashing is deliberately slow and CPU-bound; async callers should run it
/// on a blocking thread. The hasher is cheap to clone.
#[derive(Debug, Clone)]
pub struct SecretHasher {
    argon2: Argon2<'static>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("invalid Argon2 parameters: {0}")]
    InvalidParams(String),
    #[error("stored secret is not a valid hash: {0}")]
    MalformedHash(String),
    #[error("secret hashing failed: {0}")]
    Hashing(String),
}

impl SecretHasher {
    /// Server defaults: ~64 MiB memory, 3 iterations, single lane.
    pub const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
    pub const DEFAULT_ITERATIONS: u32 = 3;
    pub const DEFAULT_PARALLELISM: u32 = 1;

    pub fn new() -> Result<Self, HashError> {
        Self::with_params(
            Self::DEFAULT_MEMORY_KIB,
            Self::DEFAULT_ITERATIONS,
            Self::DEFAULT_PARALLELISM,
        )
    }

    /// Build a hasher with caller-specified cost (useful for tests or
    /// constrained environments).
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, HashError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|err| HashError::InvalidParams(err.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash `secret` with a fresh random salt; returns a PHC string.
    pub fn hash(&self, secret: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| HashError::Hashing(err.to_string()))
    }

    /// Compare `secret` against a stored PHC string.
    ///
    /// The parameters embedded in the stored hash win over this hasher's, so
    /// secrets hashed under an older cost keep verifying.
    pub fn verify(&self, secret: &str, stored: &str) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(stored).map_err(|err| HashError::MalformedHash(err.to_string()))?;
        match self.argon2.verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => Err(HashError::Hashing(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> SecretHasher {
        SecretHasher::with_params(1024, 1, 1).unwrap()
    }

    #[test]
    fn hash_verifies_only_the_original_secret() {
        let hasher = cheap();
        let hash = hasher.hash("pw1").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("pw1", &hash).unwrap());
        assert!(!hasher.verify("pw2", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let hasher = cheap();
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        let err = cheap().verify("pw", "plaintext").unwrap_err();
        assert!(matches!(err, HashError::MalformedHash(_)));
    }

    #[test]
    fn zero_iterations_are_rejected() {
        assert!(matches!(
            SecretHasher::with_params(1024, 0, 1),
            Err(HashError::InvalidParams(_))
        ));
    }
}
