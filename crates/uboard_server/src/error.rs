//! HTTP error mapping.
//!
//! Every failure leaves the server as
//! `{"error": {"code": "...", "message": "..."}}` with a matching status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde_json::{json, Map, Value};
use thiserror::Error;
use uboard_core::{
    AuthError, CommentServiceError, PostServiceError, RepoError, SearchError, ValidationError,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(ValidationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid username/email or password")]
    InvalidCredentials,

    #[error("email address has not been confirmed")]
    EmailNotConfirmed,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("token is invalid")]
    InvalidToken,

    #[error("token has expired")]
    TokenExpired,

    #[error("account is temporarily locked")]
    AccountLocked { until: i64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) | Self::InvalidToken => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthenticated | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::EmailNotConfirmed | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::TokenExpired => StatusCode::GONE,
            Self::AccountLocked { .. } => StatusCode::LOCKED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidCredentials => "invalid_credentials",
            Self::EmailNotConfirmed => "email_not_confirmed",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict { code, .. } => *code,
            Self::InvalidToken => "invalid_token",
            Self::TokenExpired => "token_expired",
            Self::AccountLocked { .. } => "account_locked",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = Map::new();
        body.insert("code".to_string(), Value::from(self.code()));

        match &self {
            Self::Internal(details) => {
                error!("event=http_error module=server status=error code=internal error={details}");
                body.insert("message".to_string(), Value::from("internal server error"));
            }
            Self::Validation(err) => {
                body.insert("message".to_string(), Value::from(self.to_string()));
                body.insert("field".to_string(), Value::from(err.field));
            }
            Self::AccountLocked { until } => {
                body.insert("message".to_string(), Value::from(self.to_string()));
                body.insert("locked_until".to_string(), Value::from(*until));
            }
            _ => {
                body.insert("message".to_string(), Value::from(self.to_string()));
            }
        }

        (status, Json(json!({ "error": body }))).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for ApiError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(format!("record not found: {id}")),
            RepoError::Conflict(column) => Self::Conflict {
                code: "conflict",
                message: format!("{column} is already in use"),
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::Validation(err) => Self::Validation(err),
            AuthError::UsernameTaken => Self::Conflict {
                code: "username_taken",
                message: value.to_string(),
            },
            AuthError::EmailTaken => Self::Conflict {
                code: "email_taken",
                message: value.to_string(),
            },
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::AccountLocked { until } => Self::AccountLocked { until },
            AuthError::EmailNotConfirmed => Self::EmailNotConfirmed,
            AuthError::InvalidToken => Self::InvalidToken,
            AuthError::TokenExpired => Self::TokenExpired,
            AuthError::InvalidSession => Self::Unauthenticated,
            AuthError::UserNotFound(_) => Self::NotFound(value.to_string()),
            AuthError::Repo(err) => Self::from(err),
        }
    }
}

impl From<PostServiceError> for ApiError {
    fn from(value: PostServiceError) -> Self {
        match value {
            PostServiceError::Validation(err) => Self::Validation(err),
            PostServiceError::PostNotFound(_) => Self::NotFound(value.to_string()),
            PostServiceError::Forbidden => Self::Forbidden(value.to_string()),
            PostServiceError::CapacityReached { .. } => Self::Conflict {
                code: "capacity_reached",
                message: value.to_string(),
            },
            PostServiceError::Repo(err) => Self::from(err),
            PostServiceError::InconsistentState(_) => Self::Internal(value.to_string()),
        }
    }
}

impl From<CommentServiceError> for ApiError {
    fn from(value: CommentServiceError) -> Self {
        match value {
            CommentServiceError::Validation(err) => Self::Validation(err),
            CommentServiceError::PostNotFound(_) | CommentServiceError::CommentNotFound(_) => {
                Self::NotFound(value.to_string())
            }
            CommentServiceError::Forbidden => Self::Forbidden(value.to_string()),
            CommentServiceError::Repo(err) => Self::from(err),
            CommentServiceError::InconsistentState(_) => Self::Internal(value.to_string()),
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(value: SearchError) -> Self {
        match value {
            SearchError::InvalidQuery { .. } => Self::BadRequest(value.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use axum::http::StatusCode;
    use uboard_core::{AuthError, PostServiceError, RepoError};

    #[test]
    fn auth_errors_map_to_documented_statuses() {
        let cases = [
            (AuthError::UsernameTaken, StatusCode::CONFLICT, "username_taken"),
            (AuthError::InvalidCredentials, StatusCode::UNAUTHORIZED, "invalid_credentials"),
            (AuthError::EmailNotConfirmed, StatusCode::FORBIDDEN, "email_not_confirmed"),
            (AuthError::TokenExpired, StatusCode::GONE, "token_expired"),
            (AuthError::AccountLocked { until: 5 }, StatusCode::LOCKED, "account_locked"),
            (AuthError::InvalidSession, StatusCode::UNAUTHORIZED, "unauthenticated"),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn capacity_and_storage_errors_map_to_conflict_and_internal() {
        let api = ApiError::from(PostServiceError::CapacityReached { capacity: 3 });
        assert_eq!(api.status(), StatusCode::CONFLICT);
        assert_eq!(api.code(), "capacity_reached");

        let api = ApiError::from(RepoError::InvalidData("bad row".to_string()));
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
