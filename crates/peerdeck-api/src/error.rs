//! HTTP error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use peerdeck_auth::AuthError;

/// API-level error with its HTTP mapping.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    retry_after: Option<i64>,
}

impl ApiError {
    /// 400.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            retry_after: None,
        }
    }

    /// 401.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
            retry_after: None,
        }
    }

    /// 403.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
            retry_after: None,
        }
    }

    /// 404.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            retry_after: None,
        }
    }

    /// 429 with a retry hint.
    #[must_use]
    pub fn too_many_requests(message: impl Into<String>, retry_after_secs: i64) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: message.into(),
            retry_after: Some(retry_after_secs.max(0)),
        }
    }

    /// 500 with a generic message; detail stays in the logs.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            retry_after: None,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::InvalidSession => {
                Self::unauthorized(err.to_string())
            }
            AuthError::AccountDisabled => Self::forbidden(err.to_string()),
            AuthError::InsufficientPermissions => Self::forbidden("Insufficient permissions"),
            AuthError::RateLimited { retry_after } => {
                let seconds = (retry_after - chrono::Utc::now()).num_seconds();
                Self::too_many_requests("too many failed attempts", seconds)
            }
            AuthError::WeakPassword => Self::bad_request(err.to_string()),
            AuthError::Store(inner) => {
                tracing::error!(error = %inner, "auth store failure");
                Self::internal("internal error")
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "unhandled api failure");
        Self::internal("internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (
            self.status,
            Json(json!({ "error": self.message })),
        )
            .into_response();
        if let Some(retry_after) = self.retry_after {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_http_codes() {
        let err: ApiError = AuthError::InvalidCredentials.into();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let err: ApiError = AuthError::InsufficientPermissions.into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.message, "Insufficient permissions");

        let err: ApiError = AuthError::RateLimited {
            retry_after: chrono::Utc::now() + chrono::Duration::minutes(15),
        }
        .into();
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert!(err.retry_after.unwrap() > 0);
    }
}
