//! `gatehouse-identity`: account consistency and authorization service.
//!
//! [`IdentityService`] is the single entry point for registration,
//! authentication, group membership, credential rotation and resource grants.
//! It owns the four collections in [`Stores`] and is the only writer to them.
//!
//! ## Consistency
//!
//! Duplicate pre-checks are advisory. The store's unique keys are the arbiter
//! for concurrent writers, and a rejection there surfaces exactly like a
//! failed pre-check. Multi-record operations use compensating writes instead
//! of transactions:
//!
//! - registration hard-deletes the new user if its credential cannot be
//!   stored
//! - group removal tombstones the group, re-checks references and restores it
//!   if a user still points at it
//! - membership and grant additions re-check their target group after the
//!   write and undo it if the group disappeared meanwhile

mod credentials;
mod error;
mod groups;
mod resources;
mod service;
mod users;

pub use error::{ErrorKind, IdentityError, IdentityResult};
pub use gatehouse_infra::Stores;
pub use gatehouse_infra::store::DeleteMode;
pub use service::IdentityService;
