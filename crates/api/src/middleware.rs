use std::sync::Arc;

use axum::{
    extract::{MatchedPath, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use gatehouse_core::UserId;
use gatehouse_identity::IdentityService;

use crate::app::errors;
use crate::authz;
use crate::context::CallerContext;

/// Header carrying the caller's user id. Session issuance lives outside this
/// service; an upstream gateway sets the header after authenticating.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AuthState {
    pub identity: Arc<IdentityService>,
}

/// Resolve the caller and reject unknown or removed users.
pub async fn caller_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let user_id = match extract_user_id(req.headers()) {
        Ok(id) => id,
        Err(status) => return errors::json_error(status, "unauthorized", "missing or invalid caller id"),
    };

    match state.identity.find_user(user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "unknown caller");
        }
        Err(err) => return errors::identity_error_to_response(err),
    }

    req.extensions_mut().insert(CallerContext::new(user_id));
    next.run(req).await
}

/// Require a resource grant for the matched route template.
///
/// Must run after [`caller_middleware`] and as a route layer, so the matched
/// path is known.
pub async fn authorize_middleware(
    State(state): State<AuthState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(caller) = req.extensions().get::<CallerContext>().copied() else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let Some(route) = req.extensions().get::<MatchedPath>().map(|p| p.as_str().to_string()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Err(denied) = authz::authorize_route(&state.identity, &caller, &route).await {
        return denied;
    }

    next.run(req).await
}

fn extract_user_id(headers: &HeaderMap) -> Result<UserId, StatusCode> {
    let header = headers.get(USER_ID_HEADER).ok_or(StatusCode::UNAUTHORIZED)?;
    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let raw = header.trim();
    if raw.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    raw.parse().map_err(|_| StatusCode::UNAUTHORIZED)
}
