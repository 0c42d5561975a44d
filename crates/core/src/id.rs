//! Strongly-typed identifiers used across the domain.
//!
//! Identifiers are store-independent UUIDv7 tokens. The canonical string form
//! is the hyphenated UUID; [`Identifier::to_hex`] yields the 32-character hex
//! token used by clients that expect opaque hex ids. Parsing accepts both.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Common surface of every identifier newtype.
pub trait Identifier:
    Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display + Send + Sync + 'static
{
    fn from_uuid(uuid: Uuid) -> Self;

    fn as_uuid(&self) -> &Uuid;

    /// Simple (unhyphenated) lowercase hex form.
    fn to_hex(&self) -> String {
        self.as_uuid().simple().to_string()
    }
}

/// Identifier of a user account.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

/// Identifier of a credential (one login method of a user).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialId(Uuid);

/// Identifier of a permission group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(Uuid);

/// Identifier of a resource grant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Identifier for $t {
            fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        // Matches the serde representation, so ids can be used in store filters.
        impl From<$t> for serde_json::Value {
            fn from(value: $t) -> Self {
                serde_json::Value::String(value.0.to_string())
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s.trim())
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(UserId, "UserId");
impl_uuid_newtype!(CredentialId, "CredentialId");
impl_uuid_newtype!(GroupId, "GroupId");
impl_uuid_newtype!(ResourceId, "ResourceId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_and_hyphenated_forms_parse_to_the_same_id() {
        let id = UserId::new();
        let from_hex: UserId = id.to_hex().parse().unwrap();
        let from_display: UserId = id.to_string().parse().unwrap();

        assert_eq!(id.to_hex().len(), 32);
        assert_eq!(from_hex, id);
        assert_eq!(from_display, id);
    }

    #[test]
    fn malformed_id_is_rejected() {
        let err = "not-an-id".parse::<GroupId>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(msg) if msg.starts_with("GroupId")));
    }

    #[test]
    fn json_value_matches_serde_form() {
        let id = CredentialId::new();
        let via_from: serde_json::Value = id.into();
        assert_eq!(via_from, serde_json::to_value(id).unwrap());
    }
}
