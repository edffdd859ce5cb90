use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::SecurityLog;
use crate::services::UserProfile;

/// Machine-readable error code carried by every failed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    AuthenticationRequired,
    InvalidToken,
    TokenExpired,
    InvalidCredentials,
    InvalidRefreshToken,
    UserNotFound,
    InsufficientPrivileges,
    AccountDisabled,
    AccountLocked,
    RateLimited,
    EmailAlreadyExists,
    NotFound,
    InternalError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Seconds until a refused client may try again.
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
            code: None,
            details: None,
            retry_after: None,
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success(data)
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(message.into()),
            code: Some(code),
            details: None,
            retry_after: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            error: None,
            code: None,
            details: None,
            retry_after: None,
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

// Missing fields deserialize as empty so validation can name them.

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct SecurityLogQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub user_id: Option<i32>,
    pub action: Option<String>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user: UserProfile,
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct ProfilePayload {
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityLogDto {
    pub id: i64,
    pub user_id: Option<i32>,
    pub action: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub details: Option<Value>,
    pub created_at: String,
}

impl From<SecurityLog> for SecurityLogDto {
    fn from(entry: SecurityLog) -> Self {
        // Details are stored as JSON text; anything unparsable is passed through as a string.
        let details = entry.details.map(|raw| {
            serde_json::from_str(&raw).unwrap_or(Value::String(raw))
        });

        Self {
            id: entry.id,
            user_id: entry.user_id,
            action: entry.action,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            success: entry.success,
            details,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_shape() {
        let body = serde_json::to_value(ApiResponse::<()>::error(
            ErrorCode::AccountLocked,
            "locked",
        ))
        .unwrap();

        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "locked");
        assert_eq!(body["code"], "ACCOUNT_LOCKED");
        assert!(body.get("data").is_none());
        assert!(body.get("retryAfter").is_none());
    }

    #[test]
    fn security_log_details_are_decoded() {
        let dto = SecurityLogDto::from(SecurityLog {
            id: 1,
            user_id: None,
            action: "failed_login".to_string(),
            ip_address: None,
            user_agent: None,
            success: false,
            details: Some(r#"{"reason":"user_not_found"}"#.to_string()),
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
        });
        assert_eq!(dto.details.unwrap()["reason"], "user_not_found");
    }
}
