//! Admin routes for groups, grants and memberships.
//!
//! Every route here is guarded by [`authorize_middleware`]: the caller needs a
//! resource grant for the route template. [`ADMIN_APIS`] lists the templates
//! so startup can grant them to the owner group.
//!
//! [`authorize_middleware`]: crate::middleware::authorize_middleware

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Json, Router,
};

use gatehouse_auth::{ApiPath, NewGroup, ResourceChange};

use crate::app::dto::{self, ApiQuery, GrantRequest, MembershipRequest, RemoveQuery, UpdateResourceRequest};
use crate::app::{errors, services::AppServices};

pub const GROUPS: &str = "/admin/groups";
pub const GROUP: &str = "/admin/groups/:id";
pub const GROUP_RESOURCES: &str = "/admin/groups/:id/resources";
pub const RESOURCE: &str = "/admin/resources/:id";
pub const API_GROUPS: &str = "/admin/api-groups";
pub const USER: &str = "/admin/users/:id";
pub const USER_GROUPS: &str = "/admin/users/:id/groups";
pub const USER_GROUP: &str = "/admin/users/:id/groups/:group_id";
pub const USER_AUTHORIZED: &str = "/admin/users/:id/authorized";

pub const ADMIN_APIS: &[&str] = &[
    GROUPS,
    GROUP,
    GROUP_RESOURCES,
    RESOURCE,
    API_GROUPS,
    USER,
    USER_GROUPS,
    USER_GROUP,
    USER_AUTHORIZED,
];

pub fn router() -> Router {
    Router::new()
        .route(GROUPS, get(list_groups).post(create_group))
        .route(GROUP, delete(remove_group))
        .route(GROUP_RESOURCES, get(group_resources).post(grant))
        .route(RESOURCE, patch(update_resource).delete(revoke))
        .route(API_GROUPS, get(groups_for_api))
        .route(USER, delete(remove_user))
        .route(USER_GROUPS, post(add_to_groups))
        .route(USER_GROUP, delete(remove_from_group))
        .route(USER_AUTHORIZED, get(check_authorized))
}

/// GET /admin/groups
pub async fn list_groups(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.identity.list_groups().await {
        Ok(groups) => (StatusCode::OK, Json(serde_json::json!({ "groups": groups }))).into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// POST /admin/groups
pub async fn create_group(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<NewGroup>,
) -> axum::response::Response {
    match services.identity.add_group(body).await {
        Ok(group) => (StatusCode::CREATED, Json(group)).into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// DELETE /admin/groups/:id - Refused while any user references the group
pub async fn remove_group(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_group_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.identity.remove_group(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// GET /admin/groups/:id/resources
pub async fn group_resources(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_group_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.identity.resources_for_group(id).await {
        Ok(resources) => (StatusCode::OK, Json(serde_json::json!({ "resources": resources }))).into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// POST /admin/groups/:id/resources - Grant an API to the group
pub async fn grant(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<GrantRequest>,
) -> axum::response::Response {
    let id = match dto::parse_group_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.identity.add_resource(id, body.api).await {
        Ok(resource) => (StatusCode::CREATED, Json(resource)).into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// PATCH /admin/resources/:id
pub async fn update_resource(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateResourceRequest>,
) -> axum::response::Response {
    let id = match dto::parse_resource_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let group_id = match body.group.as_deref().map(dto::parse_group_id).transpose() {
        Ok(group_id) => group_id,
        Err(resp) => return resp,
    };
    let change = ResourceChange {
        group_id,
        api: body.api,
    };
    match services.identity.update_resource(id, change).await {
        Ok(resource) => (StatusCode::OK, Json(resource)).into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// DELETE /admin/resources/:id
pub async fn revoke(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<RemoveQuery>,
) -> axum::response::Response {
    let id = match dto::parse_resource_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.identity.remove_resource(id, query.mode()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// GET /admin/api-groups?api=/posts/publish - Groups granted an API
pub async fn groups_for_api(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<ApiQuery>,
) -> axum::response::Response {
    match services.identity.groups_for_api(&ApiPath::new(query.api)).await {
        Ok(groups) => (StatusCode::OK, Json(serde_json::json!({ "groups": groups }))).into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// DELETE /admin/users/:id?mode=soft|hard
pub async fn remove_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<RemoveQuery>,
) -> axum::response::Response {
    let id = match dto::parse_user_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.identity.remove_user(id, query.mode()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// POST /admin/users/:id/groups
pub async fn add_to_groups(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<MembershipRequest>,
) -> axum::response::Response {
    let id = match dto::parse_user_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let groups = match dto::parse_group_ids(&body.groups) {
        Ok(groups) => groups,
        Err(resp) => return resp,
    };
    match services.identity.add_user_to_groups(id, &groups).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// DELETE /admin/users/:id/groups/:group_id
pub async fn remove_from_group(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, group_id)): Path<(String, String)>,
) -> axum::response::Response {
    let ids = dto::parse_user_id(&id).and_then(|id| Ok((id, dto::parse_group_id(&group_id)?)));
    let (id, group_id) = match ids {
        Ok(ids) => ids,
        Err(resp) => return resp,
    };
    match services.identity.remove_user_from_group(id, group_id).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}

/// GET /admin/users/:id/authorized?api=/posts/publish
pub async fn check_authorized(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<ApiQuery>,
) -> axum::response::Response {
    let id = match dto::parse_user_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let api = ApiPath::new(query.api);
    match services.identity.is_authorized(id, &api).await {
        Ok(allowed) => (
            StatusCode::OK,
            Json(serde_json::json!({ "api": api, "authorized": allowed })),
        )
            .into_response(),
        Err(e) => errors::identity_error_to_response(e),
    }
}
