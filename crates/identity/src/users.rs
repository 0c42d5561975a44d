//! Registration and user lifecycle.

use chrono::Utc;

use gatehouse_auth::{Credential, NewCredential, NewUser, ProfileUpdate, User};
use gatehouse_core::UserId;
use gatehouse_infra::store::{DeleteMode, Filter, Patch, StoreError};

use crate::error::{IdentityError, IdentityResult};
use crate::service::IdentityService;

impl IdentityService {
    /// Create a user together with its first credential.
    ///
    /// Steps: duplicate checks, insert user, hash and insert credential. If
    /// the credential cannot be stored the user is hard-deleted before the
    /// error is returned, so a failed registration leaves no account behind.
    pub async fn register(&self, user: NewUser, credential: NewCredential) -> IdentityResult<(User, Credential)> {
        user.validate()?;
        credential.validate()?;

        let name = user.name.trim().to_string();
        let key = credential.key();

        if self.user_exists(&name).await? {
            return Err(IdentityError::DuplicateUser(name));
        }
        if self.auth_exists(&key).await? {
            return Err(IdentityError::DuplicateCredential(key.to_string()));
        }

        let user = user.into_user(UserId::new(), Utc::now());
        self.stores.users.insert(&user).await.map_err(|e| match e {
            e if e.is_unique_violation() => IdentityError::DuplicateUser(name.clone()),
            e => e.into(),
        })?;

        match self.store_credential(user.id, credential).await {
            Ok(credential) => {
                tracing::info!(user_id = %user.id, name = %user.name, credential = %key, "user registered");
                Ok((user, credential))
            }
            Err(original) => Err(self.roll_back_registration(user.id, original).await),
        }
    }

    /// Undo step 3 of registration. Always a hard delete.
    async fn roll_back_registration(&self, user_id: UserId, original: IdentityError) -> IdentityError {
        tracing::warn!(%user_id, error = %original, "credential creation failed; removing new user");

        match self.stores.users.remove_by_id(user_id, DeleteMode::Hard).await {
            Ok(_) => original,
            Err(cleanup) => {
                tracing::error!(
                    %user_id,
                    error = %original,
                    cleanup_error = %cleanup,
                    "registration rollback failed; user has no credential"
                );
                IdentityError::RollbackFailed {
                    original: Box::new(original),
                    cleanup,
                }
            }
        }
    }

    /// Whether the name is taken. Soft-deleted users keep their name.
    pub async fn user_exists(&self, name: &str) -> IdentityResult<bool> {
        let filter = Filter::new().eq(User::FIELD_NAME, name.trim()).include_deleted();
        Ok(self.stores.users.exists(&filter).await?)
    }

    pub async fn find_user(&self, id: UserId) -> IdentityResult<Option<User>> {
        Ok(self.stores.users.find_by_id(id).await?)
    }

    pub async fn find_user_by_name(&self, name: &str) -> IdentityResult<Option<User>> {
        let filter = Filter::new().eq(User::FIELD_NAME, name.trim());
        Ok(self.stores.users.find_one(&filter).await?)
    }

    /// Live user or `NotFound`.
    pub(crate) async fn require_user(&self, id: UserId) -> IdentityResult<User> {
        self.find_user(id)
            .await?
            .ok_or_else(|| IdentityError::not_found("user", id))
    }

    pub async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> IdentityResult<User> {
        update.validate()?;
        if update.is_empty() {
            return Err(IdentityError::Validation("nothing to change".into()));
        }

        let current = self.require_user(id).await?;
        let mut patch = Patch::new();

        if let Some(name) = update.name.as_deref().map(str::trim) {
            if name != current.name {
                if self.user_exists(name).await? {
                    return Err(IdentityError::DuplicateUser(name.to_string()));
                }
                patch = patch.set(User::FIELD_NAME, name);
            }
        }
        if let Some(avatar) = update.avatar {
            patch = patch.set(User::FIELD_AVATAR, avatar);
        }
        if let Some(bio) = update.bio {
            patch = patch.set(User::FIELD_BIO, bio);
        }

        let updated = self
            .stores
            .users
            .update_by_id(id, &patch)
            .await
            .map_err(|e| match (e, update.name.as_deref()) {
                (e, Some(name)) if e.is_unique_violation() => IdentityError::DuplicateUser(name.trim().to_string()),
                (e, _) => e.into(),
            })?;
        if !updated {
            return Err(IdentityError::not_found("user", id));
        }

        tracing::info!(user_id = %id, "profile updated");
        self.require_user(id).await
    }

    /// Remove the user, then every credential it owns, with the same mode.
    pub async fn remove_user(&self, id: UserId, mode: DeleteMode) -> IdentityResult<()> {
        if !self.stores.users.remove_by_id(id, mode).await? {
            return Err(IdentityError::not_found("user", id));
        }

        let mut owned = Filter::new().eq(Credential::FIELD_USER_ID, id);
        if mode == DeleteMode::Hard {
            owned = owned.include_deleted();
        }
        let removed = self
            .stores
            .credentials
            .remove_many(&owned, mode)
            .await
            .inspect_err(|e: &StoreError| {
                tracing::error!(user_id = %id, error = %e, "user removed but its credentials were not");
            })?;

        tracing::info!(user_id = %id, ?mode, credentials = removed, "user removed");
        Ok(())
    }
}
