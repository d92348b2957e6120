use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use newsdesk_common::NewsdeskError;

/// API-facing error wrapper mapping the error taxonomy onto HTTP statuses.
pub struct ApiError(pub NewsdeskError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<NewsdeskError> for ApiError {
    fn from(err: NewsdeskError) -> Self {
        Self(err)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self(NewsdeskError::Database(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            NewsdeskError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            NewsdeskError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            NewsdeskError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            NewsdeskError::Cancelled => (StatusCode::CONFLICT, "task cancelled".to_string()),
            NewsdeskError::UpstreamHttp { .. }
            | NewsdeskError::UpstreamTimeout(_)
            | NewsdeskError::UpstreamConnect(_)
            | NewsdeskError::BackendUnavailable(_) => {
                (StatusCode::BAD_GATEWAY, self.0.to_string())
            }
            NewsdeskError::Parse(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            NewsdeskError::Database(e) => {
                // A unique violation is a client-visible conflict.
                if let Some(db_err) = e.as_database_error() {
                    if db_err.is_unique_violation() {
                        return (
                            StatusCode::CONFLICT,
                            Json(serde_json::json!({ "error": "duplicate resource" })),
                        )
                            .into_response();
                    }
                }
                error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            NewsdeskError::Internal(e) => {
                error!(error = %e, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
