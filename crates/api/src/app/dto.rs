use std::str::FromStr;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_auth::{ApiPath, Credential, CredentialKey, CredentialType, NewCredential, User};
use gatehouse_core::{CredentialId, GroupId, UserId};
use gatehouse_identity::DeleteMode;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct IssueCodeRequest {
    pub destination: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    pub credential: NewCredential,
    /// Correlation key returned when the code was issued.
    pub code_key: String,
    pub code: String,
}

// No Debug: carries a plaintext secret.
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(flatten)]
    pub key: CredentialKey,
    #[serde(default)]
    pub secret: String,
}

#[derive(Deserialize)]
pub struct ChangeCredentialRequest {
    #[serde(rename = "type")]
    pub kind: CredentialType,
    pub name: String,
    #[serde(default)]
    pub third: bool,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

impl ChangeCredentialRequest {
    pub fn key(&self) -> CredentialKey {
        CredentialKey::new(self.kind.clone(), self.name.clone(), self.third)
    }
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct MembershipRequest {
    pub groups: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub api: ApiPath,
}

#[derive(Debug, Deserialize)]
pub struct UpdateResourceRequest {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub api: Option<ApiPath>,
}

#[derive(Debug, Deserialize)]
pub struct ApiQuery {
    pub api: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoveQuery {
    #[serde(default)]
    pub mode: Option<DeleteMode>,
}

impl RemoveQuery {
    /// Removal over HTTP is soft unless asked otherwise.
    pub fn mode(&self) -> DeleteMode {
        self.mode.unwrap_or(DeleteMode::Soft)
    }
}

// -------------------------
// Response DTOs
// -------------------------

/// A credential without its secret.
#[derive(Debug, Serialize)]
pub struct CredentialView {
    pub id: CredentialId,
    #[serde(rename = "type")]
    pub kind: CredentialType,
    pub name: String,
    pub user_id: UserId,
    pub third: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Credential> for CredentialView {
    fn from(c: Credential) -> Self {
        Self {
            id: c.id,
            kind: c.kind,
            name: c.name,
            user_id: c.user_id,
            third: c.third,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: User,
    pub credential: CredentialView,
}

// -------------------------
// Parsing helpers
// -------------------------

fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, axum::response::Response> {
    T::from_str(raw).map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation",
            format!("invalid {what} id: {raw}"),
        )
    })
}

pub fn parse_user_id(raw: &str) -> Result<UserId, axum::response::Response> {
    parse_id(raw, "user")
}

pub fn parse_group_id(raw: &str) -> Result<GroupId, axum::response::Response> {
    parse_id(raw, "group")
}

pub fn parse_credential_id(raw: &str) -> Result<CredentialId, axum::response::Response> {
    parse_id(raw, "credential")
}

pub fn parse_resource_id(raw: &str) -> Result<gatehouse_core::ResourceId, axum::response::Response> {
    parse_id(raw, "resource")
}

pub fn parse_group_ids(raw: &[String]) -> Result<Vec<GroupId>, axum::response::Response> {
    raw.iter().map(|id| parse_group_id(id)).collect()
}
