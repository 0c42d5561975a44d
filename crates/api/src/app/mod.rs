//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection, identity service, code issuer, seeding
//! - `routes/`: HTTP routes + handlers (public, own account, admin)
//! - `dto.rs`: request/response DTOs and id parsing helpers
//! - `errors.rs`: error kind to status table, consistent error bodies

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        identity: services.identity.clone(),
    };

    // Admin routes additionally need a grant for their route template.
    let admin = routes::admin::router().route_layer(axum::middleware::from_fn_with_state(
        auth_state.clone(),
        middleware::authorize_middleware,
    ));

    // Protected routes: require a known caller.
    let protected = routes::account::router()
        .merge(admin)
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::caller_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::public::router())
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}

pub use services::AppServices;
