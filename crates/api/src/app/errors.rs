use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use gatehouse_identity::{ErrorKind, IdentityError};
use gatehouse_infra::codes::CodeError;

/// Fixed mapping from error kind to HTTP status.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::DuplicateUser | ErrorKind::DuplicateCredential | ErrorKind::DuplicateGroup => {
            StatusCode::CONFLICT
        }
        ErrorKind::AccountNotFound | ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidCredential => StatusCode::UNAUTHORIZED,
        ErrorKind::GroupInUse | ErrorKind::LastCredential => StatusCode::CONFLICT,
        ErrorKind::RollbackFailed | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub fn identity_error_to_response(err: IdentityError) -> axum::response::Response {
    let kind = err.kind();
    let status = status_for(kind);
    if status.is_server_error() {
        tracing::error!(error = %err, kind = kind.as_str(), "request failed");
        // Store and rollback details stay in the log.
        return json_error(status, kind.as_str(), "internal error");
    }
    json_error(status, kind.as_str(), err.to_string())
}

pub fn code_error_to_response(err: CodeError) -> axum::response::Response {
    match err {
        CodeError::UnsupportedDestination(_) | CodeError::Rejected => {
            json_error(StatusCode::BAD_REQUEST, ErrorKind::Validation.as_str(), err.to_string())
        }
        CodeError::Delivery(_) => json_error(StatusCode::BAD_GATEWAY, "delivery_failed", err.to_string()),
        CodeError::Unavailable => json_error(StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Internal.as_str(), err.to_string()),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
