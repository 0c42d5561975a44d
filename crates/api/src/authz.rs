//! API-side authorization guard.
//!
//! A caller may invoke a route when one of their groups holds a resource
//! grant for the route's path template (e.g. `/admin/groups/:id`).

use axum::http::StatusCode;

use gatehouse_auth::ApiPath;
use gatehouse_identity::IdentityService;

use crate::app::errors;
use crate::context::CallerContext;

/// Check the caller against `route`. Returns the error response to send on
/// denial.
pub async fn authorize_route(
    identity: &IdentityService,
    caller: &CallerContext,
    route: &str,
) -> Result<(), axum::response::Response> {
    let api = ApiPath::new(route.to_string());
    match identity.is_authorized(caller.user_id(), &api).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::info!(user_id = %caller.user_id(), api = route, "request denied");
            Err(errors::json_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                format!("not permitted to call {route}"),
            ))
        }
        Err(err) => Err(errors::identity_error_to_response(err)),
    }
}
