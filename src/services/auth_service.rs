//! Domain service for registration, login and account security.
//!
//! Handles credential checks, the failed-login lockout, token issuance and
//! the profile/password endpoints behind them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::auth::{HashError, TokenError, TokenPair};
use crate::db::User;
use crate::domain::{RequestContext, Role, UserId};

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is temporarily locked")]
    AccountLocked { until: DateTime<Utc> },

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("An account with this email already exists")]
    EmailAlreadyExists,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    /// The token is valid but its subject no longer exists or is inactive.
    #[error("User not found or inactive")]
    UnknownPrincipal,

    #[error("User not found")]
    UserNotFound,

    #[error("Insufficient privileges")]
    Forbidden,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl From<HashError> for AuthError {
    fn from(err: HashError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    /// `jti` of the presented access token.
    pub token_id: String,
}

/// Public view of an account. Never carries the password hash.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<String>,
    pub role: Role,
    pub email_verified: bool,
    pub member_since: String,
    pub last_login: Option<String>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            address: user.address,
            birth_date: user.birth_date,
            role: user.role,
            email_verified: user.email_verified,
            member_since: user.created_at,
            last_login: user.last_login,
        }
    }
}

/// Result of a successful register or login.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: UserProfile,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountStats {
    pub total_users: u64,
    pub active_users: u64,
    pub locked_accounts: u64,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Creates a customer account and signs it in.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::EmailAlreadyExists`] if the email is taken.
    async fn register(
        &self,
        registration: Registration,
        context: &RequestContext,
    ) -> Result<AuthSession, AuthError>;

    /// Verifies credentials, applying the lockout rules, and issues tokens.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for unknown emails and wrong
    /// passwords alike, [`AuthError::AccountLocked`] while locked (including
    /// the failure that triggers the lock) and [`AuthError::AccountDisabled`]
    /// for inactive accounts.
    async fn login(
        &self,
        email: &str,
        password: &str,
        context: &RequestContext,
    ) -> Result<AuthSession, AuthError>;

    /// Exchanges a refresh token for a fresh token pair.
    ///
    /// # Errors
    ///
    /// Any failure is reported as [`AuthError::InvalidRefreshToken`].
    async fn refresh(
        &self,
        refresh_token: &str,
        context: &RequestContext,
    ) -> Result<TokenPair, AuthError>;

    /// Records a logout. Tokens remain valid until they expire.
    async fn logout(&self, user: &AuthUser, context: &RequestContext) -> Result<(), AuthError>;

    /// Resolves a bearer token to an active, unlocked account.
    async fn authenticate(&self, access_token: &str) -> Result<AuthUser, AuthError>;

    async fn profile(&self, user_id: UserId) -> Result<UserProfile, AuthError>;

    async fn update_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
        context: &RequestContext,
    ) -> Result<UserProfile, AuthError>;

    /// Changes a user's password.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if the current password is incorrect
    /// or the new one equals it.
    async fn change_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
        context: &RequestContext,
    ) -> Result<(), AuthError>;

    /// Clears lockout counters for an account. Returns whether anything changed.
    async fn unlock(&self, email: &str, context: &RequestContext) -> Result<bool, AuthError>;

    async fn stats(&self) -> Result<AccountStats, AuthError>;
}
