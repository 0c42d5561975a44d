use gatehouse_auth::SecretHasher;
use gatehouse_infra::Stores;

use crate::error::{IdentityError, IdentityResult};

/// Orchestrates every identity operation over the owned [`Stores`].
///
/// Construct once and share behind an `Arc`; all methods take `&self`.
pub struct IdentityService {
    pub(crate) stores: Stores,
    hasher: SecretHasher,
}

impl IdentityService {
    pub fn new(stores: Stores, hasher: SecretHasher) -> Self {
        Self { stores, hasher }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Hash on the blocking pool.
    pub(crate) async fn hash_secret(&self, secret: String) -> IdentityResult<String> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| IdentityError::Internal(format!("hashing task failed: {e}")))?
            .map_err(Into::into)
    }

    pub(crate) async fn verify_secret(&self, secret: String, stored: String) -> IdentityResult<bool> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &stored))
            .await
            .map_err(|e| IdentityError::Internal(format!("verification task failed: {e}")))?
            .map_err(Into::into)
    }
}
