//! Routes acting on the caller's own account.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, put},
    Json, Router,
};

use gatehouse_auth::{CredentialChange, NewCredential, ProfileUpdate};
use gatehouse_identity::DeleteMode;

use crate::app::dto::{self, ChangeCredentialRequest, ChangePasswordRequest, CredentialView};
use crate::app::{errors, services::AppServices};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/me", get(me).patch(update_me))
        .route("/me/groups", get(my_groups))
        .route("/me/apis", get(my_apis))
        .route(
            "/me/credentials",
            get(my_credentials).post(bind_credential).put(change_credential),
        )
        .route("/me/credentials/:id", delete(unbind_credential))
        .route("/me/password", put(change_password))
}

/// GET /me
pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    match services.identity.find_user(caller.user_id()).await {
        Ok(Some(user)) => (StatusCode::OK, Json(user)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "user not found"),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// PATCH /me - Edit name, avatar or bio
pub async fn update_me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<ProfileUpdate>,
) -> axum::response::Response {
    match services.identity.update_profile(caller.user_id(), body).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// GET /me/groups
pub async fn my_groups(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    match services.identity.groups_for_user(caller.user_id()).await {
        Ok(groups) => (StatusCode::OK, Json(serde_json::json!({ "groups": groups }))).into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// GET /me/apis - Effective permitted API set
pub async fn my_apis(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    match services.identity.permitted_apis(caller.user_id()).await {
        Ok(grants) => (StatusCode::OK, Json(serde_json::json!({ "apis": grants.apis() }))).into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// GET /me/credentials
pub async fn my_credentials(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    match services.identity.credentials_for_user(caller.user_id()).await {
        Ok(credentials) => {
            let credentials: Vec<CredentialView> = credentials.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(serde_json::json!({ "credentials": credentials }))).into_response()
        }
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// POST /me/credentials - Add another login method
pub async fn bind_credential(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<NewCredential>,
) -> axum::response::Response {
    match services.identity.bind_credential(caller.user_id(), body).await {
        Ok(credential) => (StatusCode::CREATED, Json(CredentialView::from(credential))).into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// PUT /me/credentials - Rename and/or re-secret one of the caller's credentials
pub async fn change_credential(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<ChangeCredentialRequest>,
) -> axum::response::Response {
    let key = body.key();
    match services.identity.find_credential(&key).await {
        Ok(Some(credential)) if credential.user_id == caller.user_id() => {}
        Ok(_) => return errors::json_error(StatusCode::NOT_FOUND, "account_not_found", "account not found"),
        Err(e) => return errors::identity_error_to_response(e),
    }

    let change = CredentialChange {
        name: body.new_name,
        secret: body.secret,
    };
    match services.identity.change_credential(&key, change).await {
        Ok(credential) => (StatusCode::OK, Json(CredentialView::from(credential))).into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// DELETE /me/credentials/:id
pub async fn unbind_credential(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_credential_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let owned = match services.identity.credentials_for_user(caller.user_id()).await {
        Ok(credentials) => credentials.iter().any(|c| c.id == id),
        Err(e) => return errors::identity_error_to_response(e),
    };
    if !owned {
        return errors::json_error(StatusCode::NOT_FOUND, "not_found", "credential not found");
    }

    match services.identity.unbind_credential(id, DeleteMode::Soft).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// PUT /me/password - Set one secret on every local credential
pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<ChangePasswordRequest>,
) -> axum::response::Response {
    match services
        .identity
        .change_all_passwords(caller.user_id(), &body.secret)
        .await
    {
        Ok(updated) => (StatusCode::OK, Json(serde_json::json!({ "updated": updated }))).into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}
