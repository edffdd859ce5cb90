//! Security events recorded in the audit trail.

use serde::Serialize;
use std::fmt;

/// Action column of a security log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityAction {
    SuccessfulLogin,
    FailedLogin,
    UserRegistration,
    UserLogout,
    PasswordChange,
    ProfileUpdate,
    TokenRefresh,
    AccountUnlock,
}

impl SecurityAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SuccessfulLogin => "successful_login",
            Self::FailedLogin => "failed_login",
            Self::UserRegistration => "user_registration",
            Self::UserLogout => "user_logout",
            Self::PasswordChange => "password_change",
            Self::ProfileUpdate => "profile_update",
            Self::TokenRefresh => "token_refresh",
            Self::AccountUnlock => "account_unlock",
        }
    }
}

impl fmt::Display for SecurityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
