//! Resource grants: one permitted API path for one group.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::{DomainResult, Entity, GroupId, ResourceId, require_non_blank};

/// API path identifier (e.g. "/posts/publish").
///
/// Paths are compared verbatim; callers pass the route template, not the
/// concrete request URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiPath(Cow<'static, str>);

impl ApiPath {
    pub fn new(path: impl Into<Cow<'static, str>>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn validate(&self) -> DomainResult<()> {
        require_non_blank("api path", &self.0)
    }
}

impl core::fmt::Display for ApiPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&ApiPath> for serde_json::Value {
    fn from(value: &ApiPath) -> Self {
        serde_json::Value::String(value.0.to_string())
    }
}

/// A grant of `api` to every member of `group_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    #[serde(rename = "group")]
    pub group_id: GroupId,
    pub api: ApiPath,
    pub created_at: DateTime<Utc>,
}

impl Resource {
    pub const FIELD_ID: &'static str = "id";
    pub const FIELD_GROUP: &'static str = "group";
    pub const FIELD_API: &'static str = "api";

    pub fn new(group_id: GroupId, api: ApiPath, now: DateTime<Utc>) -> Self {
        Self {
            id: ResourceId::new(),
            group_id,
            api,
            created_at: now,
        }
    }
}

impl Entity for Resource {
    type Id = ResourceId;

    fn id(&self) -> ResourceId {
        self.id
    }
}

/// Edit of an existing grant. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub api: Option<ApiPath>,
}
