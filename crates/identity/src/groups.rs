//! Groups and membership.

use std::collections::BTreeSet;

use chrono::Utc;

use gatehouse_auth::{DEFAULT_GROUPS, Group, NewGroup, Resource, User};
use gatehouse_core::{GroupId, UserId};
use gatehouse_infra::store::{DeleteMode, Filter, FindOptions, Patch};

use crate::error::{IdentityError, IdentityResult};
use crate::service::IdentityService;

impl IdentityService {
    /// Insert each default group that is missing. Safe to call on every boot.
    pub async fn ensure_default_groups(&self) -> IdentityResult<Vec<Group>> {
        let mut groups = Vec::with_capacity(DEFAULT_GROUPS.len());
        for name in DEFAULT_GROUPS {
            if let Some(existing) = self.find_group_by_name(name).await? {
                groups.push(existing);
                continue;
            }

            let group = NewGroup::new(name).into_group(GroupId::new(), Utc::now());
            match self.stores.groups.insert(&group).await {
                Ok(()) => {
                    tracing::info!(group_id = %group.id, name, "default group created");
                    groups.push(group);
                }
                // Another process seeded it first.
                Err(e) if e.is_unique_violation() => {
                    let existing = self
                        .find_group_by_name(name)
                        .await?
                        .ok_or_else(|| IdentityError::not_found("group", name))?;
                    groups.push(existing);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(groups)
    }

    pub async fn add_group(&self, group: NewGroup) -> IdentityResult<Group> {
        group.validate()?;
        let name = group.name.trim().to_string();
        if self.group_exists(&name).await? {
            return Err(IdentityError::DuplicateGroup(name));
        }

        let group = group.into_group(GroupId::new(), Utc::now());
        self.stores.groups.insert(&group).await.map_err(|e| match e {
            e if e.is_unique_violation() => IdentityError::DuplicateGroup(name.clone()),
            e => e.into(),
        })?;

        tracing::info!(group_id = %group.id, name = %group.name, "group created");
        Ok(group)
    }

    /// Whether the name is taken, including by a group mid-removal.
    pub async fn group_exists(&self, name: &str) -> IdentityResult<bool> {
        let filter = Filter::new().eq(Group::FIELD_NAME, name.trim()).include_deleted();
        Ok(self.stores.groups.exists(&filter).await?)
    }

    pub async fn find_group(&self, id: GroupId) -> IdentityResult<Option<Group>> {
        Ok(self.stores.groups.find_by_id(id).await?)
    }

    pub async fn find_group_by_name(&self, name: &str) -> IdentityResult<Option<Group>> {
        let filter = Filter::new().eq(Group::FIELD_NAME, name.trim());
        Ok(self.stores.groups.find_one(&filter).await?)
    }

    /// Live groups in creation order.
    pub async fn list_groups(&self) -> IdentityResult<Vec<Group>> {
        Ok(self.stores.groups.find_many(&Filter::new(), &FindOptions::new()).await?)
    }

    pub(crate) async fn require_group(&self, id: GroupId) -> IdentityResult<Group> {
        self.find_group(id)
            .await?
            .ok_or_else(|| IdentityError::not_found("group", id))
    }

    /// Live groups among `ids`.
    async fn live_groups(&self, ids: &[GroupId]) -> IdentityResult<BTreeSet<GroupId>> {
        let filter = Filter::new().one_of(Group::FIELD_ID, ids.iter().copied());
        let groups = self.stores.groups.find_many(&filter, &FindOptions::new()).await?;
        Ok(groups.into_iter().map(|g| g.id).collect())
    }

    pub async fn groups_for_user(&self, user_id: UserId) -> IdentityResult<Vec<Group>> {
        let user = self.require_user(user_id).await?;
        if user.groups.is_empty() {
            return Ok(Vec::new());
        }
        let filter = Filter::new().one_of(Group::FIELD_ID, user.groups.iter().copied());
        Ok(self.stores.groups.find_many(&filter, &FindOptions::new()).await?)
    }

    /// Remove a group nobody references, along with its grants.
    ///
    /// The group is tombstoned before the final reference count so that a
    /// concurrent [`add_user_to_groups`](Self::add_user_to_groups) either sees
    /// it gone or is seen by the count. Soft-deleted users count as
    /// references.
    pub async fn remove_group(&self, id: GroupId) -> IdentityResult<()> {
        self.require_group(id).await?;

        let referencing = Filter::new().contains(User::FIELD_GROUPS, id).include_deleted();
        if self.stores.users.exists(&referencing).await? {
            return Err(IdentityError::GroupInUse(id));
        }

        if !self.stores.groups.remove_by_id(id, DeleteMode::Soft).await? {
            return Err(IdentityError::not_found("group", id));
        }

        let original = match self.stores.users.count(&referencing).await {
            Ok(0) => None,
            Ok(_) => Some(IdentityError::GroupInUse(id)),
            Err(e) => Some(e.into()),
        };
        if let Some(original) = original {
            return Err(match self.stores.groups.restore_by_id(id).await {
                Ok(_) => {
                    tracing::info!(group_id = %id, error = %original, "group removal aborted; restored");
                    original
                }
                Err(cleanup) => {
                    tracing::error!(
                        group_id = %id,
                        error = %original,
                        cleanup_error = %cleanup,
                        "failed to restore group after aborted removal"
                    );
                    IdentityError::RollbackFailed {
                        original: Box::new(original),
                        cleanup,
                    }
                }
            });
        }

        self.stores.groups.remove_by_id(id, DeleteMode::Hard).await?;
        let grants = Filter::new().eq(Resource::FIELD_GROUP, id).include_deleted();
        let revoked = self.stores.resources.remove_many(&grants, DeleteMode::Hard).await?;

        tracing::info!(group_id = %id, revoked, "group removed");
        Ok(())
    }

    /// Add the user to every group in `group_ids`. Already-held memberships
    /// are left as they are.
    pub async fn add_user_to_groups(&self, user_id: UserId, group_ids: &[GroupId]) -> IdentityResult<User> {
        let wanted: Vec<GroupId> = group_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if wanted.is_empty() {
            return self.require_user(user_id).await;
        }

        let live = self.live_groups(&wanted).await?;
        if let Some(missing) = wanted.iter().find(|id| !live.contains(id)) {
            return Err(IdentityError::not_found("group", missing));
        }

        let patch = Patch::new().add_to_set(User::FIELD_GROUPS, wanted.iter().copied());
        if !self.stores.users.update_by_id(user_id, &patch).await? {
            return Err(IdentityError::not_found("user", user_id));
        }

        // A group removed between the check and the write must not stay
        // referenced.
        let live = self.live_groups(&wanted).await?;
        let vanished: Vec<GroupId> = wanted.iter().copied().filter(|id| !live.contains(id)).collect();
        if let Some(first) = vanished.first().copied() {
            self.stores
                .users
                .update_by_id(user_id, &Patch::new().pull(User::FIELD_GROUPS, vanished.iter().copied()))
                .await?;
            tracing::warn!(%user_id, group_id = %first, "group removed during membership change");
            return Err(IdentityError::not_found("group", first));
        }

        tracing::info!(%user_id, groups = wanted.len(), "user added to groups");
        self.require_user(user_id).await
    }

    pub async fn remove_user_from_group(&self, user_id: UserId, group_id: GroupId) -> IdentityResult<User> {
        let patch = Patch::new().pull(User::FIELD_GROUPS, [group_id]);
        if !self.stores.users.update_by_id(user_id, &patch).await? {
            return Err(IdentityError::not_found("user", user_id));
        }

        tracing::info!(%user_id, %group_id, "user removed from group");
        self.require_user(user_id).await
    }
}
