//! User profile records and group membership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::{DomainResult, Entity, GroupId, UserId, require_non_blank};

/// A user account.
///
/// # Invariants
/// - `name` is unique across all users, soft-deleted ones included.
/// - After registration completes the user is reachable by at least one live
///   credential.
/// - `groups` has set semantics: no group id appears twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub groups: Vec<GroupId>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub const FIELD_ID: &'static str = "id";
    pub const FIELD_NAME: &'static str = "name";
    pub const FIELD_GROUPS: &'static str = "groups";
    pub const FIELD_AVATAR: &'static str = "avatar";
    pub const FIELD_BIO: &'static str = "bio";

    pub fn is_member_of(&self, group_id: GroupId) -> bool {
        self.groups.contains(&group_id)
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }
}

/// Candidate user supplied to registration (no id yet).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl NewUser {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        require_non_blank("user name", &self.name)
    }

    /// Materialize the record with a freshly allocated id.
    pub fn into_user(self, id: UserId, now: DateTime<Utc>) -> User {
        User {
            id,
            name: self.name.trim().to_string(),
            groups: Vec::new(),
            avatar: self.avatar,
            bio: self.bio,
            created_at: now,
        }
    }
}

/// Partial profile edit. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.avatar.is_none() && self.bio.is_none()
    }

    pub fn validate(&self) -> DomainResult<()> {
        if let Some(name) = &self.name {
            require_non_blank("user name", name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_trims_name_and_starts_without_groups() {
        let id = UserId::new();
        let user = NewUser::new("  alice ").into_user(id, Utc::now());

        assert_eq!(user.id, id);
        assert_eq!(user.name, "alice");
        assert!(user.groups.is_empty());
    }

    #[test]
    fn blank_name_fails_validation() {
        assert!(NewUser::new("").validate().is_err());
        assert!(NewUser::new("bob").validate().is_ok());

        let rename = ProfileUpdate {
            name: Some(" ".into()),
            ..Default::default()
        };
        assert!(rename.validate().is_err());
    }

    #[test]
    fn serialized_field_names_match_filter_constants() {
        let user = NewUser::new("carol").into_user(UserId::new(), Utc::now());
        let value = serde_json::to_value(&user).unwrap();

        for field in [
            User::FIELD_ID,
            User::FIELD_NAME,
            User::FIELD_GROUPS,
            User::FIELD_AVATAR,
            User::FIELD_BIO,
        ] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
    }
}
