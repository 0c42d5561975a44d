//! Permission groups (roles).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::{DomainResult, Entity, GroupId, require_non_blank};

/// Groups every deployment starts with, in seeding order.
pub const DEFAULT_GROUPS: [&str; 5] = [
    "Member",
    "Trial Moderator",
    "Moderator",
    "Administrator",
    "Site Owner",
];

/// A named role; the unit of authorization granting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub const FIELD_ID: &'static str = "id";
    pub const FIELD_NAME: &'static str = "name";
    pub const FIELD_CREATED_AT: &'static str = "created_at";
}

impl Entity for Group {
    type Id = GroupId;

    fn id(&self) -> GroupId {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroup {
    pub name: String,
    #[serde(default)]
    pub icon: String,
}

impl NewGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            icon: String::new(),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        require_non_blank("group name", &self.name)
    }

    pub fn into_group(self, id: GroupId, now: DateTime<Utc>) -> Group {
        Group {
            id,
            name: self.name.trim().to_string(),
            icon: self.icon,
            created_at: now,
        }
    }
}
