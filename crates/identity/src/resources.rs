//! Resource grants and authorization.

use std::collections::BTreeSet;

use chrono::Utc;

use gatehouse_auth::{ApiPath, Grants, Group, Resource, ResourceChange};
use gatehouse_core::{GroupId, ResourceId, UserId};
use gatehouse_infra::store::{DeleteMode, Filter, FindOptions, Patch};

use crate::error::{IdentityError, IdentityResult};
use crate::service::IdentityService;

impl IdentityService {
    /// Grant `api` to `group_id`. Granting an existing pair returns the
    /// existing row.
    pub async fn add_resource(&self, group_id: GroupId, api: ApiPath) -> IdentityResult<Resource> {
        api.validate()?;
        self.require_group(group_id).await?;

        let pair = Filter::new()
            .eq(Resource::FIELD_GROUP, group_id)
            .eq(Resource::FIELD_API, &api);
        if let Some(existing) = self.stores.resources.find_one(&pair).await? {
            return Ok(existing);
        }

        let resource = Resource::new(group_id, api, Utc::now());
        self.stores.resources.insert(&resource).await?;

        // Same race as membership: the group may be gone by now.
        if self.find_group(group_id).await?.is_none() {
            let original = IdentityError::not_found("group", group_id);
            if let Err(cleanup) = self
                .stores
                .resources
                .remove_by_id(resource.id, DeleteMode::Hard)
                .await
            {
                tracing::error!(
                    resource_id = %resource.id,
                    %group_id,
                    cleanup_error = %cleanup,
                    "failed to revoke grant of vanished group"
                );
                return Err(IdentityError::RollbackFailed {
                    original: Box::new(original),
                    cleanup,
                });
            }
            return Err(original);
        }

        tracing::info!(resource_id = %resource.id, %group_id, api = %resource.api, "resource granted");
        Ok(resource)
    }

    /// Whether any group of the user is granted `api`.
    ///
    /// Unknown and soft-deleted users are simply not authorized.
    pub async fn is_authorized(&self, user_id: UserId, api: &ApiPath) -> IdentityResult<bool> {
        let Some(user) = self.find_user(user_id).await? else {
            return Ok(false);
        };
        if user.groups.is_empty() {
            return Ok(false);
        }

        let filter = Filter::new()
            .eq(Resource::FIELD_API, api)
            .one_of(Resource::FIELD_GROUP, user.groups.iter().copied());
        Ok(self.stores.resources.exists(&filter).await?)
    }

    /// Groups granted `api`.
    pub async fn groups_for_api(&self, api: &ApiPath) -> IdentityResult<Vec<Group>> {
        let granted: BTreeSet<GroupId> = self
            .resources_for_api(api)
            .await?
            .into_iter()
            .map(|r| r.group_id)
            .collect();
        if granted.is_empty() {
            return Ok(Vec::new());
        }

        let filter = Filter::new().one_of(Group::FIELD_ID, granted);
        Ok(self.stores.groups.find_many(&filter, &FindOptions::new()).await?)
    }

    pub async fn resources_for_group(&self, group_id: GroupId) -> IdentityResult<Vec<Resource>> {
        let filter = Filter::new().eq(Resource::FIELD_GROUP, group_id);
        Ok(self.stores.resources.find_many(&filter, &FindOptions::new()).await?)
    }

    pub async fn resources_for_api(&self, api: &ApiPath) -> IdentityResult<Vec<Resource>> {
        let filter = Filter::new().eq(Resource::FIELD_API, api);
        Ok(self.stores.resources.find_many(&filter, &FindOptions::new()).await?)
    }

    pub async fn resources_for_user(&self, user_id: UserId) -> IdentityResult<Vec<Resource>> {
        let user = self.require_user(user_id).await?;
        if user.groups.is_empty() {
            return Ok(Vec::new());
        }
        let filter = Filter::new().one_of(Resource::FIELD_GROUP, user.groups.iter().copied());
        Ok(self.stores.resources.find_many(&filter, &FindOptions::new()).await?)
    }

    /// The resolved set of APIs the user may call.
    pub async fn permitted_apis(&self, user_id: UserId) -> IdentityResult<Grants> {
        let user = self.require_user(user_id).await?;
        let resources = self.resources_for_user(user_id).await?;
        Ok(Grants::resolve(&user.groups, &resources))
    }

    pub async fn update_resource(&self, id: ResourceId, change: ResourceChange) -> IdentityResult<Resource> {
        let mut patch = Patch::new();
        if let Some(group_id) = change.group_id {
            self.require_group(group_id).await?;
            patch = patch.set(Resource::FIELD_GROUP, group_id);
        }
        if let Some(api) = &change.api {
            api.validate()?;
            patch = patch.set(Resource::FIELD_API, api);
        }
        if patch.is_empty() {
            return Err(IdentityError::Validation("nothing to change".into()));
        }

        if !self.stores.resources.update_by_id(id, &patch).await? {
            return Err(IdentityError::not_found("resource", id));
        }

        tracing::info!(resource_id = %id, "resource updated");
        self.stores
            .resources
            .find_by_id(id)
            .await?
            .ok_or_else(|| IdentityError::not_found("resource", id))
    }

    pub async fn remove_resource(&self, id: ResourceId, mode: DeleteMode) -> IdentityResult<()> {
        if !self.stores.resources.remove_by_id(id, mode).await? {
            return Err(IdentityError::not_found("resource", id));
        }
        tracing::info!(resource_id = %id, ?mode, "resource revoked");
        Ok(())
    }
}
