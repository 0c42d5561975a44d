//! HTTP API: routing, request/response mapping, caller authorization.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
