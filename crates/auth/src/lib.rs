//! `gatehouse-auth`: account and authorization data model.
//!
//! This crate is intentionally decoupled from HTTP and storage: it defines the
//! records the identity service persists, secret hashing, and the pure grant
//! resolution used to answer "may this user call this API".

pub mod authorize;
pub mod credential;
pub mod group;
pub mod hashing;
pub mod resource;
pub mod user;

pub use authorize::Grants;
pub use credential::{Credential, CredentialChange, CredentialKey, CredentialType, NewCredential};
pub use group::{DEFAULT_GROUPS, Group, NewGroup};
pub use hashing::{HashError, SecretHasher};
pub use resource::{ApiPath, Resource, ResourceChange};
pub use user::{NewUser, ProfileUpdate, User};
