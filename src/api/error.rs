use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::fmt;

use super::{ApiResponse, ErrorCode, FieldError};
use crate::auth::TokenError;
use crate::services::AuthError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    DatabaseError(String),

    ValidationError(String),

    InvalidFields(Vec<FieldError>),

    Conflict(String),

    InternalError(String),

    Unauthorized { code: ErrorCode, message: String },

    Forbidden { code: ErrorCode, message: String },

    Locked { until: DateTime<Utc> },

    RateLimited { retry_after_secs: u64 },
}

/// Underlying cause of a 5xx, attached to the response extensions so a
/// development-only middleware can expose it.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            Self::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            Self::InvalidFields(fields) => write!(f, "Validation error: {} invalid field(s)", fields.len()),
            Self::Conflict(msg) => write!(f, "Conflict: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
            Self::Unauthorized { message, .. } => write!(f, "Unauthorized: {message}"),
            Self::Forbidden { message, .. } => write!(f, "Forbidden: {message}"),
            Self::Locked { until } => write!(f, "Account locked until {until}"),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited, retry after {retry_after_secs}s")
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut internal_detail = None;
        let mut retry_after = None;

        let (status, body) = match self {
            Self::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ApiResponse::<()>::error(ErrorCode::NotFound, msg),
            ),
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                internal_detail = Some(msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiResponse::error(ErrorCode::InternalError, "A database error occurred"),
                )
            }
            Self::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ApiResponse::error(ErrorCode::ValidationError, msg),
            ),
            Self::InvalidFields(fields) => (
                StatusCode::BAD_REQUEST,
                ApiResponse::error(ErrorCode::ValidationError, "Validation failed")
                    .with_details(json!(fields)),
            ),
            Self::Conflict(msg) => (
                StatusCode::CONFLICT,
                ApiResponse::error(ErrorCode::EmailAlreadyExists, msg),
            ),
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                internal_detail = Some(msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiResponse::error(ErrorCode::InternalError, "An internal error occurred"),
                )
            }
            Self::Unauthorized { code, message } => {
                (StatusCode::UNAUTHORIZED, ApiResponse::error(code, message))
            }
            Self::Forbidden { code, message } => {
                (StatusCode::FORBIDDEN, ApiResponse::error(code, message))
            }
            Self::Locked { until } => (
                StatusCode::LOCKED,
                ApiResponse::error(
                    ErrorCode::AccountLocked,
                    "Account is temporarily locked due to too many failed login attempts",
                )
                .with_details(json!({
                    "lockedUntil": until.to_rfc3339_opts(SecondsFormat::Millis, true),
                })),
            ),
            Self::RateLimited { retry_after_secs } => {
                retry_after = Some(retry_after_secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    ApiResponse {
                        retry_after: Some(retry_after_secs),
                        ..ApiResponse::error(
                            ErrorCode::RateLimited,
                            "Too many requests from this address, try again later",
                        )
                    },
                )
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        if let Some(detail) = internal_detail {
            response
                .extensions_mut()
                .insert(InternalErrorDetail(detail));
        }
        response
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(format!("{err:#}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::ValidationError(rejection.body_text())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::Unauthorized {
                code: ErrorCode::InvalidCredentials,
                message: "Invalid email or password".to_string(),
            },
            AuthError::AccountLocked { until } => Self::Locked { until },
            AuthError::AccountDisabled => Self::Forbidden {
                code: ErrorCode::AccountDisabled,
                message: "Account is disabled".to_string(),
            },
            AuthError::EmailAlreadyExists => {
                Self::Conflict("An account with this email already exists".to_string())
            }
            AuthError::Validation(msg) => Self::ValidationError(msg),
            AuthError::Token(TokenError::Expired) => Self::Unauthorized {
                code: ErrorCode::TokenExpired,
                message: "Token has expired".to_string(),
            },
            AuthError::Token(TokenError::Signing(msg)) => Self::InternalError(msg),
            AuthError::Token(TokenError::InvalidSignature | TokenError::Malformed) => {
                Self::Unauthorized {
                    code: ErrorCode::InvalidToken,
                    message: "Invalid token".to_string(),
                }
            }
            AuthError::InvalidRefreshToken => Self::Unauthorized {
                code: ErrorCode::InvalidRefreshToken,
                message: "Invalid refresh token".to_string(),
            },
            AuthError::UnknownPrincipal => Self::Unauthorized {
                code: ErrorCode::UserNotFound,
                message: "User not found or inactive".to_string(),
            },
            AuthError::UserNotFound => Self::NotFound("User not found".to_string()),
            AuthError::Forbidden => Self::insufficient_privileges(),
            AuthError::Database(msg) => Self::DatabaseError(msg),
            AuthError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    #[must_use]
    pub fn authentication_required() -> Self {
        Self::Unauthorized {
            code: ErrorCode::AuthenticationRequired,
            message: "Authentication required".to_string(),
        }
    }

    #[must_use]
    pub fn insufficient_privileges() -> Self {
        Self::Forbidden {
            code: ErrorCode::InsufficientPrivileges,
            message: "Insufficient privileges".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AuthError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn auth_errors_map_to_status_table() {
        assert_eq!(status_of(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(AuthError::AccountLocked { until: Utc::now() }),
            StatusCode::LOCKED
        );
        assert_eq!(status_of(AuthError::AccountDisabled), StatusCode::FORBIDDEN);
        assert_eq!(status_of(AuthError::EmailAlreadyExists), StatusCode::CONFLICT);
        assert_eq!(
            status_of(AuthError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AuthError::Token(TokenError::Expired)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_of(AuthError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(AuthError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_errors_carry_detail_extension_only() {
        let response = ApiError::internal("disk on fire").into_response();
        let detail = response.extensions().get::<InternalErrorDetail>().unwrap();
        assert_eq!(detail.0, "disk on fire");

        let response = ApiError::validation("nope").into_response();
        assert!(response.extensions().get::<InternalErrorDetail>().is_none());
    }

    #[test]
    fn rate_limited_sets_retry_after_header() {
        let response = ApiError::RateLimited {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
