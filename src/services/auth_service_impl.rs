//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{Hasher, LockState, LockoutPolicy, TokenIssuer, TokenPair};
use crate::clock::Clock;
use crate::db::{NewUser, ProfileChanges, Store, User, format_timestamp};
use crate::domain::events::SecurityAction;
use crate::domain::{RequestContext, Role, UserId, clean_text, normalize_email};
use crate::services::auth_service::{
    AccountStats, AuthError, AuthService, AuthSession, AuthUser, ProfileUpdate, Registration,
    UserProfile,
};
use crate::services::notifier::{self, Notifier, WelcomeRecipient};
use crate::services::security_log::SecurityLogger;

fn record_login_outcome(outcome: &'static str) {
    metrics::counter!("auth_login_attempts_total", "outcome" => outcome).increment(1);
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|v| clean_text(&v)).filter(|v| !v.is_empty())
}

pub struct SeaOrmAuthService {
    store: Store,
    hasher: Hasher,
    tokens: Arc<TokenIssuer>,
    lockout: LockoutPolicy,
    security_log: SecurityLogger,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    rehash_on_login: bool,
    /// Verified against when the email is unknown, so both paths cost one argon2 run.
    dummy_digest: OnceCell<String>,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(
        store: Store,
        hasher: Hasher,
        tokens: Arc<TokenIssuer>,
        lockout: LockoutPolicy,
        security_log: SecurityLogger,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            lockout,
            security_log,
            notifier,
            clock,
            rehash_on_login: true,
            dummy_digest: OnceCell::new(),
        }
    }

    #[must_use]
    pub const fn with_rehash_on_login(mut self, enabled: bool) -> Self {
        self.rehash_on_login = enabled;
        self
    }

    /// Applies a failed password check and decides which error the caller sees.
    async fn register_failure(
        &self,
        user: &User,
        context: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<AuthError, AuthError> {
        let updated = self
            .store
            .record_failed_login(user.id, &self.lockout, now)
            .await?;

        let (attempts, locked_until) = updated.map_or(
            (user.failed_login_attempts.saturating_add(1), None),
            |u| (u.failed_login_attempts, u.locked_until),
        );
        let lock = locked_until.filter(|until| now <= *until);

        self.security_log
            .log(
                Some(user.id),
                SecurityAction::FailedLogin,
                context,
                false,
                Some(json!({
                    "reason": "invalid_password",
                    "attempts": attempts,
                    "locked": lock.is_some(),
                })),
            )
            .await;

        if let Some(until) = lock {
            metrics::counter!("auth_lockouts_total").increment(1);
            record_login_outcome("locked");
            warn!(user_id = %user.id, attempts, until = %until, "Account locked after repeated failed logins");
            Ok(AuthError::AccountLocked { until })
        } else {
            record_login_outcome("invalid_password");
            debug!(user_id = %user.id, attempts, "Failed login");
            Ok(AuthError::InvalidCredentials)
        }
    }

    /// Clears a lock that has run out. Returns the error to raise if still locked.
    async fn check_lock(&self, user: &User, now: DateTime<Utc>) -> Result<(), AuthError> {
        match self
            .lockout
            .state(user.failed_login_attempts, user.locked_until, now)
        {
            LockState::Locked { until } => Err(AuthError::AccountLocked { until }),
            LockState::LockExpired => {
                if self.store.clear_expired_lock(user.id, now).await? {
                    info!(user_id = %user.id, "Lock expired, account unlocked");
                }
                Ok(())
            }
            LockState::Unlocked { .. } => Ok(()),
        }
    }

    async fn verify_against_dummy(&self, password: &str) {
        let digest = self
            .dummy_digest
            .get_or_try_init(|| async {
                self.hasher
                    .hash_blocking(&Uuid::new_v4().to_string())
                    .await
            })
            .await;

        match digest {
            Ok(digest) => {
                let _ = self.hasher.verify_blocking(password, digest).await;
            }
            Err(e) => warn!(error = %e, "Failed to prepare dummy password hash"),
        }
    }

    async fn rehash(&self, user_id: UserId, password: &str) -> Result<(), AuthError> {
        let digest = self.hasher.hash_blocking(password).await?;
        self.store
            .update_password_hash(user_id, &digest, self.clock.now())
            .await?;
        debug!(user_id = %user_id, "Password hash upgraded to current parameters");
        Ok(())
    }

    fn issue_tokens(&self, user: &User) -> Result<TokenPair, AuthError> {
        Ok(self.tokens.issue_pair(user.id, &user.email, user.role)?)
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(
        &self,
        registration: Registration,
        context: &RequestContext,
    ) -> Result<AuthSession, AuthError> {
        let email = normalize_email(&registration.email);

        if self.store.get_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailAlreadyExists);
        }

        let password_hash = self.hasher.hash_blocking(&registration.password).await?;

        let new_user = NewUser {
            email,
            password_hash,
            first_name: clean_text(&registration.first_name),
            last_name: clean_text(&registration.last_name),
            phone: optional_text(registration.phone),
            role: Role::Customer,
            email_verified: false,
        };

        // A concurrent registration can still win the unique index.
        let user = self
            .store
            .create_user(&new_user, self.clock.now())
            .await?
            .ok_or(AuthError::EmailAlreadyExists)?;

        self.security_log
            .log(
                Some(user.id),
                SecurityAction::UserRegistration,
                context,
                true,
                Some(json!({ "email": user.email })),
            )
            .await;

        info!(user_id = %user.id, "User registered");

        notifier::spawn_welcome(
            Arc::clone(&self.notifier),
            WelcomeRecipient {
                email: user.email.clone(),
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
            },
        );

        let tokens = self.issue_tokens(&user)?;

        Ok(AuthSession {
            user: UserProfile::from(user),
            tokens,
        })
    }

    async fn login(
        &self,
        email: &str,
        password: &str,
        context: &RequestContext,
    ) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email);

        let Some((user, digest)) = self.store.get_user_by_email_with_password(&email).await?
        else {
            self.verify_against_dummy(password).await;
            self.security_log
                .log(
                    None,
                    SecurityAction::FailedLogin,
                    context,
                    false,
                    Some(json!({ "email": email, "reason": "user_not_found" })),
                )
                .await;
            record_login_outcome("unknown_user");
            return Err(AuthError::InvalidCredentials);
        };

        // Disabled accounts are rejected before anything is recorded.
        if !user.is_active {
            record_login_outcome("disabled");
            return Err(AuthError::AccountDisabled);
        }

        let now = self.clock.now();

        if let Err(e) = self.check_lock(&user, now).await {
            if matches!(e, AuthError::AccountLocked { .. }) {
                record_login_outcome("locked");
            }
            return Err(e);
        }

        if !self.hasher.verify_blocking(password, &digest).await? {
            return Err(self.register_failure(&user, context, now).await?);
        }

        self.store.record_successful_login(user.id, now).await?;

        self.security_log
            .log(
                Some(user.id),
                SecurityAction::SuccessfulLogin,
                context,
                true,
                None,
            )
            .await;

        if self.rehash_on_login
            && self.hasher.needs_rehash(&digest)
            && let Err(e) = self.rehash(user.id, password).await
        {
            warn!(user_id = %user.id, error = %e, "Failed to upgrade password hash");
        }

        record_login_outcome("success");
        info!(user_id = %user.id, "User logged in");

        let tokens = self.issue_tokens(&user)?;
        let user = User {
            failed_login_attempts: 0,
            locked_until: None,
            last_login: Some(format_timestamp(now)),
            ..user
        };

        Ok(AuthSession {
            user: UserProfile::from(user),
            tokens,
        })
    }

    async fn refresh(
        &self,
        refresh_token: &str,
        context: &RequestContext,
    ) -> Result<TokenPair, AuthError> {
        let claims = self.tokens.verify_refresh(refresh_token).map_err(|e| {
            debug!(error = %e, "Refresh token rejected");
            AuthError::InvalidRefreshToken
        })?;

        let user = self
            .store
            .get_user(claims.user_id())
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::InvalidRefreshToken)?;

        match self.check_lock(&user, self.clock.now()).await {
            Err(AuthError::AccountLocked { .. }) => return Err(AuthError::InvalidRefreshToken),
            other => other?,
        }

        let tokens = self.issue_tokens(&user)?;

        self.security_log
            .log(
                Some(user.id),
                SecurityAction::TokenRefresh,
                context,
                true,
                None,
            )
            .await;

        Ok(tokens)
    }

    async fn logout(&self, user: &AuthUser, context: &RequestContext) -> Result<(), AuthError> {
        self.security_log
            .log(
                Some(user.id),
                SecurityAction::UserLogout,
                context,
                true,
                Some(json!({ "tokenId": user.token_id })),
            )
            .await;

        info!(user_id = %user.id, "User logged out");
        Ok(())
    }

    async fn authenticate(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.tokens.verify_access(access_token)?;

        let user = self
            .store
            .get_user(claims.user_id())
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::UnknownPrincipal)?;

        // The token may predate a lock triggered elsewhere.
        self.check_lock(&user, self.clock.now()).await?;

        Ok(AuthUser {
            id: user.id,
            email: user.email,
            role: user.role,
            token_id: claims.jti,
        })
    }

    async fn profile(&self, user_id: UserId) -> Result<UserProfile, AuthError> {
        self.store
            .get_user(user_id)
            .await?
            .map(UserProfile::from)
            .ok_or(AuthError::UserNotFound)
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
        context: &RequestContext,
    ) -> Result<UserProfile, AuthError> {
        let changes = ProfileChanges {
            first_name: clean_text(&update.first_name),
            last_name: clean_text(&update.last_name),
            phone: optional_text(update.phone),
            address: optional_text(update.address),
            birth_date: optional_text(update.birth_date),
        };

        let user = self
            .store
            .update_profile(user_id, &changes, self.clock.now())
            .await?
            .ok_or(AuthError::UserNotFound)?;

        self.security_log
            .log(
                Some(user_id),
                SecurityAction::ProfileUpdate,
                context,
                true,
                None,
            )
            .await;

        Ok(UserProfile::from(user))
    }

    async fn change_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
        context: &RequestContext,
    ) -> Result<(), AuthError> {
        if current_password == new_password {
            return Err(AuthError::Validation(
                "New password must be different from current password".to_string(),
            ));
        }

        let digest = self
            .store
            .get_password_hash(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self.hasher.verify_blocking(current_password, &digest).await? {
            self.security_log
                .log(
                    Some(user_id),
                    SecurityAction::PasswordChange,
                    context,
                    false,
                    Some(json!({ "reason": "invalid_current_password" })),
                )
                .await;
            return Err(AuthError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }

        let new_digest = self.hasher.hash_blocking(new_password).await?;
        self.store
            .update_password_hash(user_id, &new_digest, self.clock.now())
            .await?;

        self.security_log
            .log(
                Some(user_id),
                SecurityAction::PasswordChange,
                context,
                true,
                None,
            )
            .await;

        info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    async fn unlock(&self, email: &str, context: &RequestContext) -> Result<bool, AuthError> {
        let user = self
            .store
            .get_user_by_email(&normalize_email(email))
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let changed = self.store.unlock_user(user.id, self.clock.now()).await?;

        if changed {
            self.security_log
                .log(
                    Some(user.id),
                    SecurityAction::AccountUnlock,
                    context,
                    true,
                    Some(json!({ "previousAttempts": user.failed_login_attempts })),
                )
                .await;
            info!(user_id = %user.id, "Account unlocked by operator");
        }

        Ok(changed)
    }

    async fn stats(&self) -> Result<AccountStats, AuthError> {
        Ok(AccountStats {
            total_users: self.store.count_users().await?,
            active_users: self.store.count_active_users().await?,
            locked_accounts: self.store.count_locked_users(self.clock.now()).await?,
        })
    }
}
