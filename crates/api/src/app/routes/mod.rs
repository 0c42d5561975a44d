pub mod account;
pub mod admin;
pub mod public;
pub mod system;
