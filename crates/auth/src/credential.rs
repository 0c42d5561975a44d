//! Credentials: the ways a user can authenticate.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::{CredentialId, DomainError, DomainResult, Entity, UserId, require_non_blank};

/// Login handle type (`phone`, `email`, or a third-party provider name).
///
/// Modeled as an opaque string so new providers need no code change; the
/// well-known local types get constants and handle validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialType(Cow<'static, str>);

impl CredentialType {
    pub const PHONE: CredentialType = CredentialType(Cow::Borrowed("phone"));
    pub const EMAIL: CredentialType = CredentialType(Cow::Borrowed("email"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that `handle` is plausible for this type.
    pub fn validate_handle(&self, handle: &str) -> DomainResult<()> {
        require_non_blank("credential name", handle)?;
        match self.as_str() {
            "email" => {
                let well_formed = handle
                    .split_once('@')
                    .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
                if !well_formed || handle.chars().any(char::is_whitespace) {
                    return Err(DomainError::validation(format!("malformed email address '{handle}'")));
                }
            }
            "phone" => {
                let digits = handle.strip_prefix('+').unwrap_or(handle);
                if digits.len() < 5 || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return Err(DomainError::validation(format!("malformed phone number '{handle}'")));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl core::fmt::Display for CredentialType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored credential.
///
/// `secret` holds an Argon2 PHC string for local credentials and the
/// provider-supplied value for third-party ones.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    #[serde(rename = "type")]
    pub kind: CredentialType,
    pub name: String,
    pub secret: String,
    pub user_id: UserId,
    pub third: bool,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub const FIELD_ID: &'static str = "id";
    pub const FIELD_TYPE: &'static str = "type";
    pub const FIELD_NAME: &'static str = "name";
    pub const FIELD_SECRET: &'static str = "secret";
    pub const FIELD_USER_ID: &'static str = "user_id";
    pub const FIELD_THIRD: &'static str = "third";

    pub fn key(&self) -> CredentialKey {
        CredentialKey {
            kind: self.kind.clone(),
            name: self.name.clone(),
            third: self.third,
        }
    }
}

impl Entity for Credential {
    type Id = CredentialId;

    fn id(&self) -> CredentialId {
        self.id
    }
}

impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("secret", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("third", &self.third)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// The unique login handle of a credential: `(type, name, third)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialKey {
    #[serde(rename = "type")]
    pub kind: CredentialType,
    pub name: String,
    #[serde(default)]
    pub third: bool,
}

impl CredentialKey {
    pub fn new(kind: CredentialType, name: impl Into<String>, third: bool) -> Self {
        Self {
            kind,
            name: name.into(),
            third,
        }
    }
}

impl core::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)?;
        if self.third {
            f.write_str(" (third-party)")?;
        }
        Ok(())
    }
}

/// Candidate credential supplied to registration or binding.
///
/// `secret` is plaintext here; it is hashed before it reaches a store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCredential {
    #[serde(rename = "type")]
    pub kind: CredentialType,
    pub name: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub third: bool,
}

impl NewCredential {
    pub fn password(kind: CredentialType, name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            secret: secret.into(),
            third: false,
        }
    }

    pub fn third_party(provider: impl Into<Cow<'static, str>>, name: impl Into<String>) -> Self {
        Self {
            kind: CredentialType::new(provider),
            name: name.into(),
            secret: String::new(),
            third: true,
        }
    }

    pub fn key(&self) -> CredentialKey {
        CredentialKey {
            kind: self.kind.clone(),
            name: self.name.trim().to_string(),
            third: self.third,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        require_non_blank("credential type", self.kind.as_str())?;
        if self.third {
            require_non_blank("credential name", &self.name)
        } else {
            self.kind.validate_handle(self.name.trim())?;
            require_non_blank("secret", &self.secret)
        }
    }

    /// Bind to an owner. `stored_secret` is the already-hashed secret for
    /// local credentials.
    pub fn into_credential(
        self,
        id: CredentialId,
        user_id: UserId,
        stored_secret: String,
        now: DateTime<Utc>,
    ) -> Credential {
        Credential {
            id,
            kind: self.kind,
            name: self.name.trim().to_string(),
            secret: stored_secret,
            user_id,
            third: self.third,
            created_at: now,
        }
    }
}

impl core::fmt::Debug for NewCredential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NewCredential")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("secret", &"<redacted>")
            .field("third", &self.third)
            .finish()
    }
}

/// Rename and/or re-secret request for an existing credential.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialChange {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

impl CredentialChange {
    pub fn validate(&self, kind: &CredentialType, third: bool) -> DomainResult<()> {
        if let Some(name) = &self.name {
            kind.validate_handle(name.trim())?;
        }
        match &self.secret {
            Some(_) if third => Err(DomainError::validation(
                "third-party credentials carry no local secret",
            )),
            Some(secret) => require_non_blank("secret", secret),
            None if self.name.is_none() => Err(DomainError::validation("nothing to change")),
            None => Ok(()),
        }
    }
}

impl core::fmt::Debug for CredentialChange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CredentialChange")
            .field("name", &self.name)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_and_phone_handles_are_checked() {
        assert!(CredentialType::EMAIL.validate_handle("alice@x.com").is_ok());
        assert!(CredentialType::EMAIL.validate_handle("alice").is_err());
        assert!(CredentialType::EMAIL.validate_handle("@x.com").is_err());
        assert!(CredentialType::PHONE.validate_handle("+8613800000000").is_ok());
        assert!(CredentialType::PHONE.validate_handle("12ab5").is_err());
        assert!(CredentialType::new("github").validate_handle("octocat").is_ok());
    }

    #[test]
    fn local_credentials_need_a_secret() {
        let cred = NewCredential::password(CredentialType::EMAIL, "a@b.c", "");
        assert!(cred.validate().is_err());

        let third = NewCredential::third_party("github", "octocat");
        assert!(third.validate().is_ok());
    }

    #[test]
    fn third_party_change_rejects_secret() {
        let change = CredentialChange {
            name: None,
            secret: Some("pw".into()),
        };
        assert!(change.validate(&CredentialType::new("github"), true).is_err());
        assert!(change.validate(&CredentialType::EMAIL, false).is_ok());
        assert!(CredentialChange::default().validate(&CredentialType::EMAIL, false).is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let cred = NewCredential::password(CredentialType::EMAIL, "a@b.c", "hunter2");
        assert!(!format!("{cred:?}").contains("hunter2"));
    }

    #[test]
    fn stored_type_field_is_named_type() {
        let cred = NewCredential::password(CredentialType::EMAIL, "a@b.c", "pw").into_credential(
            CredentialId::new(),
            UserId::new(),
            "hash".into(),
            Utc::now(),
        );
        let value = serde_json::to_value(&cred).unwrap();
        assert_eq!(value[Credential::FIELD_TYPE], "email");
        assert_eq!(value[Credential::FIELD_THIRD], false);
        assert!(value.get(Credential::FIELD_USER_ID).is_some());
    }
}
