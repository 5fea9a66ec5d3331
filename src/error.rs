use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::auth::AuthError;
use crate::forms::FieldError;
use crate::lifecycle::LifecycleError;

/// Error returned by handlers. Rendered as `{"success": false, "error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("malformed form data: {0}")]
    Multipart(#[from] MultipartError),
    #[error("document rendering failed: {0}")]
    Render(#[from] tera::Error),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Lifecycle(e) => match e {
                LifecycleError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                LifecycleError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
                LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
                LifecycleError::AuthGuard => StatusCode::FORBIDDEN,
                LifecycleError::InvalidTransition { .. } | LifecycleError::Conflict(_) => {
                    StatusCode::CONFLICT
                }
            },
            ApiError::Auth(e) => match e {
                AuthError::LoginDisabled => StatusCode::SERVICE_UNAVAILABLE,
                AuthError::BadCredentials | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
                AuthError::Issue(_) | AuthError::Hash(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Multipart(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Render(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn fields(&self) -> &[FieldError] {
        match self {
            ApiError::Lifecycle(LifecycleError::Validation(fields)) => fields,
            _ => &[],
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {:?}", self);
        }

        // Storage internals stay in the log.
        let message = match &self {
            ApiError::Lifecycle(LifecycleError::Persistence(_)) => {
                "The proposal store is unavailable, please try again later".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "error": message,
            "fields": self.fields(),
        });
        (status, Json(body)).into_response()
    }
}
