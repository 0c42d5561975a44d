//! Authentication and credential lifecycle.

use chrono::Utc;

use gatehouse_auth::{Credential, CredentialChange, CredentialKey, NewCredential, User};
use gatehouse_core::{CredentialId, UserId, require_non_blank};
use gatehouse_infra::store::{DeleteMode, Filter, Patch};

use crate::error::{IdentityError, IdentityResult};
use crate::service::IdentityService;

fn by_key(key: &CredentialKey) -> Filter {
    Filter::new()
        .eq(Credential::FIELD_TYPE, key.kind.as_str())
        .eq(Credential::FIELD_NAME, key.name.trim())
        .eq(Credential::FIELD_THIRD, key.third)
}

impl IdentityService {
    /// Check a login and resolve its owner.
    ///
    /// Third-party credentials are trusted as presented; `secret` is ignored
    /// for them.
    pub async fn authenticate(&self, key: &CredentialKey, secret: &str) -> IdentityResult<(User, Credential)> {
        let credential = self.find_credential(key).await?.ok_or(IdentityError::AccountNotFound)?;

        if !credential.third {
            let matches = self
                .verify_secret(secret.to_string(), credential.secret.clone())
                .await?;
            if !matches {
                tracing::info!(credential = %key, "authentication rejected");
                return Err(IdentityError::InvalidCredential);
            }
        }

        let user = self
            .find_user(credential.user_id)
            .await?
            .ok_or(IdentityError::AccountNotFound)?;

        tracing::debug!(user_id = %user.id, credential = %key, "authenticated");
        Ok((user, credential))
    }

    /// Whether a live credential holds `key`.
    pub async fn auth_exists(&self, key: &CredentialKey) -> IdentityResult<bool> {
        Ok(self.stores.credentials.exists(&by_key(key)).await?)
    }

    pub async fn find_credential(&self, key: &CredentialKey) -> IdentityResult<Option<Credential>> {
        Ok(self.stores.credentials.find_one(&by_key(key)).await?)
    }

    pub async fn credentials_for_user(&self, user_id: UserId) -> IdentityResult<Vec<Credential>> {
        let filter = Filter::new().eq(Credential::FIELD_USER_ID, user_id);
        Ok(self.stores.credentials.find_many(&filter, &Default::default()).await?)
    }

    /// Hash (unless third-party) and insert a credential for `user_id`.
    pub(crate) async fn store_credential(
        &self,
        user_id: UserId,
        credential: NewCredential,
    ) -> IdentityResult<Credential> {
        let key = credential.key();
        let stored_secret = if credential.third {
            String::new()
        } else {
            self.hash_secret(credential.secret.clone()).await?
        };

        let credential = credential.into_credential(CredentialId::new(), user_id, stored_secret, Utc::now());
        self.stores.credentials.insert(&credential).await.map_err(|e| match e {
            e if e.is_unique_violation() => IdentityError::DuplicateCredential(key.to_string()),
            e => e.into(),
        })?;
        Ok(credential)
    }

    /// Add another login method to an existing user.
    pub async fn bind_credential(&self, user_id: UserId, credential: NewCredential) -> IdentityResult<Credential> {
        credential.validate()?;
        let key = credential.key();

        self.require_user(user_id).await?;
        if self.auth_exists(&key).await? {
            return Err(IdentityError::DuplicateCredential(key.to_string()));
        }

        let credential = self.store_credential(user_id, credential).await?;

        // The owner may have been removed between the check and the insert.
        if self.find_user(user_id).await?.is_none() {
            let original = IdentityError::not_found("user", user_id);
            if let Err(cleanup) = self
                .stores
                .credentials
                .remove_by_id(credential.id, DeleteMode::Hard)
                .await
            {
                tracing::error!(
                    %user_id,
                    credential_id = %credential.id,
                    cleanup_error = %cleanup,
                    "failed to remove credential of vanished user"
                );
                return Err(IdentityError::RollbackFailed {
                    original: Box::new(original),
                    cleanup,
                });
            }
            return Err(original);
        }

        tracing::info!(%user_id, credential = %key, "credential bound");
        Ok(credential)
    }

    /// Remove one credential. A user's last live credential cannot be
    /// removed this way.
    pub async fn unbind_credential(&self, id: CredentialId, mode: DeleteMode) -> IdentityResult<()> {
        let credential = self
            .stores
            .credentials
            .find_by_id(id)
            .await?
            .ok_or_else(|| IdentityError::not_found("credential", id))?;

        let user_id = credential.user_id;
        let owned = Filter::new().eq(Credential::FIELD_USER_ID, user_id);
        if self.stores.credentials.count(&owned).await? <= 1 {
            return Err(IdentityError::LastCredential(user_id));
        }

        // Tombstone first, then recount: of two concurrent unbinds, at least
        // one sees the other's tombstone.
        if !self.stores.credentials.remove_by_id(id, DeleteMode::Soft).await? {
            return Err(IdentityError::not_found("credential", id));
        }

        let original = match self.stores.credentials.count(&owned).await {
            Ok(0) => IdentityError::LastCredential(user_id),
            Ok(_) => {
                if mode == DeleteMode::Hard {
                    self.stores.credentials.remove_by_id(id, DeleteMode::Hard).await?;
                }
                tracing::info!(credential_id = %id, %user_id, ?mode, "credential unbound");
                return Ok(());
            }
            Err(e) => e.into(),
        };

        match self.stores.credentials.restore_by_id(id).await {
            Ok(_) => {
                tracing::info!(credential_id = %id, %user_id, "unbind raced another; credential restored");
                Err(original)
            }
            Err(cleanup) => {
                tracing::error!(
                    credential_id = %id,
                    %user_id,
                    error = %original,
                    cleanup_error = %cleanup,
                    "failed to restore credential after aborted unbind"
                );
                Err(IdentityError::RollbackFailed {
                    original: Box::new(original),
                    cleanup,
                })
            }
        }
    }

    /// Rename and/or re-secret the credential holding `key`.
    pub async fn change_credential(&self, key: &CredentialKey, change: CredentialChange) -> IdentityResult<Credential> {
        let credential = self.find_credential(key).await?.ok_or(IdentityError::AccountNotFound)?;
        change.validate(&credential.kind, credential.third)?;

        let mut patch = Patch::new();
        let mut renamed = None;

        if let Some(name) = change.name.as_deref().map(str::trim) {
            if name != credential.name {
                let target = CredentialKey::new(credential.kind.clone(), name, credential.third);
                if self.auth_exists(&target).await? {
                    return Err(IdentityError::DuplicateCredential(target.to_string()));
                }
                patch = patch.set(Credential::FIELD_NAME, name);
                renamed = Some(target);
            }
        }
        if let Some(secret) = change.secret {
            let hashed = self.hash_secret(secret).await?;
            patch = patch.set(Credential::FIELD_SECRET, hashed);
        }

        if !patch.is_empty() {
            let updated = self
                .stores
                .credentials
                .update_by_id(credential.id, &patch)
                .await
                .map_err(|e| match (e, &renamed) {
                    (e, Some(target)) if e.is_unique_violation() => {
                        IdentityError::DuplicateCredential(target.to_string())
                    }
                    (e, _) => e.into(),
                })?;
            if !updated {
                return Err(IdentityError::AccountNotFound);
            }
            tracing::info!(credential_id = %credential.id, renamed = renamed.is_some(), "credential changed");
        }

        self.stores
            .credentials
            .find_by_id(credential.id)
            .await?
            .ok_or(IdentityError::AccountNotFound)
    }

    /// Re-hash `secret` once and apply it to every live local credential of
    /// the user. Returns the number of credentials updated.
    pub async fn change_all_passwords(&self, user_id: UserId, secret: &str) -> IdentityResult<u64> {
        require_non_blank("secret", secret)?;
        self.require_user(user_id).await?;

        let hashed = self.hash_secret(secret.to_string()).await?;
        let filter = Filter::new()
            .eq(Credential::FIELD_USER_ID, user_id)
            .eq(Credential::FIELD_THIRD, false);
        let updated = self
            .stores
            .credentials
            .update_many(&filter, &Patch::new().set(Credential::FIELD_SECRET, hashed))
            .await?;

        tracing::info!(%user_id, credentials = updated, "passwords changed");
        Ok(updated)
    }
}
