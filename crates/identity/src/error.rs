//! Identity service errors.
//!
//! Every failure carries a stable [`ErrorKind`]. Outer layers map kinds, not
//! variants, so adding context to a variant never changes the wire contract.

use serde::Serialize;
use thiserror::Error;

use gatehouse_auth::HashError;
use gatehouse_core::{DomainError, GroupId, UserId};
use gatehouse_infra::store::StoreError;

pub type IdentityResult<T> = Result<T, IdentityError>;

/// Stable, machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    DuplicateUser,
    DuplicateCredential,
    DuplicateGroup,
    AccountNotFound,
    InvalidCredential,
    GroupInUse,
    NotFound,
    LastCredential,
    RollbackFailed,
    Internal,
    StoreUnavailable,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::DuplicateUser => "duplicate_user",
            ErrorKind::DuplicateCredential => "duplicate_credential",
            ErrorKind::DuplicateGroup => "duplicate_group",
            ErrorKind::AccountNotFound => "account_not_found",
            ErrorKind::InvalidCredential => "invalid_credential",
            ErrorKind::GroupInUse => "group_in_use",
            ErrorKind::NotFound => "not_found",
            ErrorKind::LastCredential => "last_credential",
            ErrorKind::RollbackFailed => "rollback_failed",
            ErrorKind::Internal => "internal",
            ErrorKind::StoreUnavailable => "store_unavailable",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("user '{0}' already exists")]
    DuplicateUser(String),

    #[error("credential {0} already exists")]
    DuplicateCredential(String),

    #[error("group '{0}' already exists")]
    DuplicateGroup(String),

    #[error("account not found")]
    AccountNotFound,

    #[error("invalid credential")]
    InvalidCredential,

    #[error("group {0} is still assigned to users")]
    GroupInUse(GroupId),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("user {0} has no other credential")]
    LastCredential(UserId),

    /// A compensating write after a failed step failed too.
    #[error("rollback failed ({cleanup}) after: {original}")]
    RollbackFailed {
        original: Box<IdentityError>,
        cleanup: StoreError,
    },

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(StoreError),
}

impl IdentityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::Validation(_) => ErrorKind::Validation,
            IdentityError::DuplicateUser(_) => ErrorKind::DuplicateUser,
            IdentityError::DuplicateCredential(_) => ErrorKind::DuplicateCredential,
            IdentityError::DuplicateGroup(_) => ErrorKind::DuplicateGroup,
            IdentityError::AccountNotFound => ErrorKind::AccountNotFound,
            IdentityError::InvalidCredential => ErrorKind::InvalidCredential,
            IdentityError::GroupInUse(_) => ErrorKind::GroupInUse,
            IdentityError::NotFound { .. } => ErrorKind::NotFound,
            IdentityError::LastCredential(_) => ErrorKind::LastCredential,
            IdentityError::RollbackFailed { .. } => ErrorKind::RollbackFailed,
            IdentityError::Internal(_) => ErrorKind::Internal,
            IdentityError::Store(_) => ErrorKind::StoreUnavailable,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        IdentityError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Uniqueness rejections become the duplicate error of the collection that
/// raised them. Callers that know the offending value map it themselves.
impl From<StoreError> for IdentityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { collection: "users", key } => IdentityError::DuplicateUser(key),
            StoreError::UniqueViolation {
                collection: "credentials",
                key,
            } => IdentityError::DuplicateCredential(key),
            StoreError::UniqueViolation { collection: "groups", key } => IdentityError::DuplicateGroup(key),
            StoreError::InvalidPatch(message) => IdentityError::Internal(message),
            other => IdentityError::Store(other),
        }
    }
}

impl From<DomainError> for IdentityError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(message) | DomainError::InvalidId(message) => {
                IdentityError::Validation(message)
            }
        }
    }
}

impl From<HashError> for IdentityError {
    fn from(err: HashError) -> Self {
        IdentityError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violations_map_by_collection() {
        let err: IdentityError = StoreError::UniqueViolation {
            collection: "credentials",
            key: "credentials_login_key".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::DuplicateCredential);

        let err: IdentityError = StoreError::UniqueViolation {
            collection: "groups",
            key: "groups_name_key".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::DuplicateGroup);
    }

    #[test]
    fn store_faults_are_unavailable() {
        let err: IdentityError = StoreError::Timeout("count on users".into()).into();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert_eq!(err.kind().as_str(), "store_unavailable");
    }

    #[test]
    fn rollback_failure_keeps_both_causes() {
        let err = IdentityError::RollbackFailed {
            original: Box::new(IdentityError::DuplicateCredential("email:a@x.com".into())),
            cleanup: StoreError::Unavailable("connection reset".into()),
        };
        let text = err.to_string();
        assert!(text.contains("connection reset"));
        assert!(text.contains("email:a@x.com"));
        assert_eq!(err.kind(), ErrorKind::RollbackFailed);
    }
}
