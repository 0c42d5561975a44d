//! `gatehouse-core`: identity primitives shared by every layer.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult, require_non_blank};
pub use id::{CredentialId, GroupId, Identifier, ResourceId, UserId};
