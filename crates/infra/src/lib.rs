//! Infrastructure layer: document stores, configuration, verification codes.

pub mod codes;
pub mod config;
pub mod store;
pub mod stores;

pub use stores::Stores;
