//! Unauthenticated routes: verification codes, registration, login.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use gatehouse_auth::NewUser;

use crate::app::dto::{CredentialView, IssueCodeRequest, LoginRequest, RegisterRequest, SessionResponse};
use crate::app::{errors, services::AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/codes", post(issue_code))
        .route("/users", post(register))
        .route("/sessions", post(login))
}

/// POST /codes - Send a registration code to an email address or phone
pub async fn issue_code(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<IssueCodeRequest>,
) -> axum::response::Response {
    match services.codes.issue(&body.destination).await {
        Ok(issued) => (StatusCode::CREATED, Json(issued)).into_response(),
        Err(e) => errors::code_error_to_response(e),
    }
}

/// POST /users - Register with a verified email or phone credential
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<RegisterRequest>,
) -> axum::response::Response {
    if body.credential.third {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation",
            "third-party accounts cannot be registered here",
        );
    }
    if let Err(e) = services
        .codes
        .verify(&body.code_key, &body.credential.name, &body.code)
    {
        return errors::code_error_to_response(e);
    }

    let user = NewUser {
        name: body.name,
        avatar: body.avatar,
        bio: body.bio,
    };
    match services.identity.register(user, body.credential).await {
        Ok((user, credential)) => (
            StatusCode::CREATED,
            Json(SessionResponse {
                user,
                credential: CredentialView::from(credential),
            }),
        )
            .into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// POST /sessions - Check a credential and return its account
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<LoginRequest>,
) -> axum::response::Response {
    // Third-party logins are vouched for by their provider, not by a secret.
    if body.key.third {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation",
            "third-party credentials sign in through their provider",
        );
    }
    match services.identity.authenticate(&body.key, &body.secret).await {
        Ok((user, credential)) => (
            StatusCode::OK,
            Json(SessionResponse {
                user,
                credential: CredentialView::from(credential),
            }),
        )
            .into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}
