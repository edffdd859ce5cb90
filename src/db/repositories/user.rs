use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, Set, SqlErr, TransactionTrait, Value,
};
use tracing::warn;

use crate::auth::LockoutPolicy;
use crate::db::{format_timestamp, parse_timestamp};
use crate::domain::{Role, UserId};
use crate::entities::{prelude::*, users};

/// User data returned from repository (without sensitive password hash)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub email_verified: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        let role = model.role.parse().unwrap_or_else(|_| {
            warn!(user_id = model.id, role = %model.role, "Unknown role in users table, treating as customer");
            Role::Customer
        });

        let locked_until = model.locked_until.as_deref().and_then(|raw| {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                warn!(user_id = model.id, "Unparsable locked_until value ignored");
            }
            parsed
        });

        Self {
            id: UserId::new(model.id),
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            phone: model.phone,
            address: model.address,
            birth_date: model.birth_date,
            role,
            is_active: model.is_active,
            email_verified: model.email_verified,
            failed_login_attempts: model.failed_login_attempts,
            locked_until,
            last_login: model.last_login,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub email_verified: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<String>,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Inserts a new account. Returns `None` when the email is already taken.
    pub async fn create(&self, user: &NewUser, now: DateTime<Utc>) -> Result<Option<User>> {
        let now = format_timestamp(now);
        let active = users::ActiveModel {
            email: Set(user.email.clone()),
            password_hash: Set(user.password_hash.clone()),
            first_name: Set(user.first_name.clone()),
            last_name: Set(user.last_name.clone()),
            phone: Set(user.phone.clone()),
            address: Set(None),
            birth_date: Set(None),
            role: Set(user.role.as_str().to_string()),
            is_active: Set(true),
            email_verified: Set(user.email_verified),
            failed_login_attempts: Set(0),
            locked_until: Set(None),
            last_login: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        match active.insert(&self.conn).await {
            Ok(model) => Ok(Some(User::from(model))),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => Ok(None),
            Err(e) => Err(e).context("Failed to insert user"),
        }
    }

    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>> {
        let user = Users::find_by_id(id.value())
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = Users::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.map(User::from))
    }

    /// Get user by email together with the stored password hash (login only)
    pub async fn get_by_email_with_password(&self, email: &str) -> Result<Option<(User, String)>> {
        let user = Users::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.map(|u| {
            let password_hash = u.password_hash.clone();
            (User::from(u), password_hash)
        }))
    }

    pub async fn get_password_hash(&self, id: UserId) -> Result<Option<String>> {
        let user = Users::find_by_id(id.value())
            .one(&self.conn)
            .await
            .context("Failed to query user for password hash")?;

        Ok(user.map(|u| u.password_hash))
    }

    /// Increments the failure counter and sets the lock in one statement,
    /// then reads the row back inside the same transaction.
    pub async fn record_failed_login(
        &self,
        id: UserId,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let lock_until = format_timestamp(
            policy
                .lock_deadline(now)
                .context("Lock duration is out of range")?,
        );
        let threshold = i32::try_from(policy.max_failed_attempts).unwrap_or(i32::MAX);

        let txn = self.conn.begin().await?;

        Users::update_many()
            .col_expr(
                users::Column::FailedLoginAttempts,
                Expr::col(users::Column::FailedLoginAttempts).add(1),
            )
            .col_expr(
                users::Column::LockedUntil,
                Expr::cust_with_values(
                    "CASE WHEN failed_login_attempts + 1 >= ? THEN ? ELSE locked_until END",
                    [Value::from(threshold), Value::from(lock_until)],
                ),
            )
            .filter(users::Column::Id.eq(id.value()))
            .exec(&txn)
            .await
            .context("Failed to record failed login")?;

        let user = Users::find_by_id(id.value())
            .one(&txn)
            .await
            .context("Failed to read back failed login counters")?;

        txn.commit().await?;

        Ok(user.map(User::from))
    }

    /// Clears a lock only if it has already run out. Returns whether this call
    /// performed the clear.
    pub async fn clear_expired_lock(&self, id: UserId, now: DateTime<Utc>) -> Result<bool> {
        let now = format_timestamp(now);
        let result = Users::update_many()
            .col_expr(users::Column::FailedLoginAttempts, Expr::value(0))
            .col_expr(users::Column::LockedUntil, Expr::value(Option::<String>::None))
            .col_expr(users::Column::UpdatedAt, Expr::value(now.clone()))
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::LockedUntil.is_not_null())
            .filter(users::Column::LockedUntil.lt(now))
            .exec(&self.conn)
            .await
            .context("Failed to clear expired lock")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn record_successful_login(&self, id: UserId, now: DateTime<Utc>) -> Result<()> {
        let now = format_timestamp(now);
        Users::update_many()
            .col_expr(users::Column::FailedLoginAttempts, Expr::value(0))
            .col_expr(users::Column::LockedUntil, Expr::value(Option::<String>::None))
            .col_expr(users::Column::LastLogin, Expr::value(now.clone()))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await
            .context("Failed to record successful login")?;

        Ok(())
    }

    /// Operator unlock regardless of lock expiry. Returns whether anything changed.
    pub async fn unlock(&self, id: UserId, now: DateTime<Utc>) -> Result<bool> {
        let result = Users::update_many()
            .col_expr(users::Column::FailedLoginAttempts, Expr::value(0))
            .col_expr(users::Column::LockedUntil, Expr::value(Option::<String>::None))
            .col_expr(users::Column::UpdatedAt, Expr::value(format_timestamp(now)))
            .filter(users::Column::Id.eq(id.value()))
            .filter(
                Condition::any()
                    .add(users::Column::LockedUntil.is_not_null())
                    .add(users::Column::FailedLoginAttempts.gt(0)),
            )
            .exec(&self.conn)
            .await
            .context("Failed to unlock user")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn update_password_hash(
        &self,
        id: UserId,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        Users::update_many()
            .col_expr(users::Column::PasswordHash, Expr::value(password_hash))
            .col_expr(users::Column::UpdatedAt, Expr::value(format_timestamp(now)))
            .filter(users::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await
            .context("Failed to update password hash")?;

        Ok(())
    }

    pub async fn update_profile(
        &self,
        id: UserId,
        changes: &ProfileChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let Some(user) = Users::find_by_id(id.value())
            .one(&self.conn)
            .await
            .context("Failed to query user for profile update")?
        else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        active.first_name = Set(changes.first_name.clone());
        active.last_name = Set(changes.last_name.clone());
        active.phone = Set(changes.phone.clone());
        active.address = Set(changes.address.clone());
        active.birth_date = Set(changes.birth_date.clone());
        active.updated_at = Set(format_timestamp(now));

        let model = active
            .update(&self.conn)
            .await
            .context("Failed to update profile")?;

        Ok(Some(User::from(model)))
    }

    pub async fn count_all(&self) -> Result<u64> {
        Users::find()
            .count(&self.conn)
            .await
            .context("Failed to count users")
    }

    pub async fn count_active(&self) -> Result<u64> {
        Users::find()
            .filter(users::Column::IsActive.eq(true))
            .count(&self.conn)
            .await
            .context("Failed to count active users")
    }

    /// Accounts whose lock has not yet run out at `now`.
    pub async fn count_locked(&self, now: DateTime<Utc>) -> Result<u64> {
        Users::find()
            .filter(users::Column::LockedUntil.gte(format_timestamp(now)))
            .count(&self.conn)
            .await
            .context("Failed to count locked users")
    }

    pub async fn exists_with_role(&self, role: Role) -> Result<bool> {
        let count = Users::find()
            .filter(users::Column::Role.eq(role.as_str()))
            .count(&self.conn)
            .await
            .context("Failed to count users by role")?;

        Ok(count > 0)
    }
}
