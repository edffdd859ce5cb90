use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::auth::LockoutPolicy;
use crate::domain::{Role, UserId};

pub mod migrator;
pub mod repositories;

pub use crate::entities::security_logs::Model as SecurityLog;
pub use repositories::security_log::{NewSecurityLog, SecurityLogFilter};
pub use repositories::user::{NewUser, ProfileChanges, User};

/// Formats a timestamp the way every column in this database stores it:
/// UTC, RFC 3339, fixed millisecond precision. Lexical order equals
/// chronological order, which the lockout comparisons rely on.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn is_memory_url(db_url: &str) -> bool {
    db_url.contains(":memory:") || db_url.contains("mode=memory")
}

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = is_memory_url(db_url);

        if !in_memory {
            let path_str = db_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)
                    .with_context(|| format!("Failed to create database file {path_str}"))?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        // Every connection to `:memory:` is its own database, so the pool is
        // pinned to a single connection that is never recycled.
        if in_memory {
            opt.max_connections(1).min_connections(1);
        } else {
            opt.max_connections(max_connections)
                .min_connections(min_connections)
                .idle_timeout(Duration::from_secs(300))
                .max_lifetime(Duration::from_secs(600));
        }

        let conn = Database::connect(opt)
            .await
            .context("Failed to connect to database")?;

        migrator::Migrator::up(&conn, None)
            .await
            .context("Failed to run migrations")?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn security_log_repo(&self) -> repositories::security_log::SecurityLogRepository {
        repositories::security_log::SecurityLogRepository::new(self.conn.clone())
    }

    // ========== Users ==========

    pub async fn create_user(&self, user: &NewUser, now: DateTime<Utc>) -> Result<Option<User>> {
        self.user_repo().create(user, now).await
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn get_user_by_email_with_password(
        &self,
        email: &str,
    ) -> Result<Option<(User, String)>> {
        self.user_repo().get_by_email_with_password(email).await
    }

    pub async fn get_password_hash(&self, id: UserId) -> Result<Option<String>> {
        self.user_repo().get_password_hash(id).await
    }

    pub async fn record_failed_login(
        &self,
        id: UserId,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        self.user_repo().record_failed_login(id, policy, now).await
    }

    pub async fn clear_expired_lock(&self, id: UserId, now: DateTime<Utc>) -> Result<bool> {
        self.user_repo().clear_expired_lock(id, now).await
    }

    pub async fn record_successful_login(&self, id: UserId, now: DateTime<Utc>) -> Result<()> {
        self.user_repo().record_successful_login(id, now).await
    }

    pub async fn unlock_user(&self, id: UserId, now: DateTime<Utc>) -> Result<bool> {
        self.user_repo().unlock(id, now).await
    }

    pub async fn update_password_hash(
        &self,
        id: UserId,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.user_repo()
            .update_password_hash(id, password_hash, now)
            .await
    }

    pub async fn update_profile(
        &self,
        id: UserId,
        changes: &ProfileChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        self.user_repo().update_profile(id, changes, now).await
    }

    pub async fn count_users(&self) -> Result<u64> {
        self.user_repo().count_all().await
    }

    pub async fn count_active_users(&self) -> Result<u64> {
        self.user_repo().count_active().await
    }

    pub async fn count_locked_users(&self, now: DateTime<Utc>) -> Result<u64> {
        self.user_repo().count_locked(now).await
    }

    pub async fn has_user_with_role(&self, role: Role) -> Result<bool> {
        self.user_repo().exists_with_role(role).await
    }

    // ========== Security log ==========

    pub async fn add_security_log(&self, entry: NewSecurityLog) -> Result<i64> {
        self.security_log_repo().insert(entry).await
    }

    pub async fn get_security_logs(
        &self,
        filter: &SecurityLogFilter,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<SecurityLog>, u64)> {
        self.security_log_repo().list(filter, page, page_size).await
    }

    pub async fn recent_security_logs(
        &self,
        filter: &SecurityLogFilter,
        limit: u64,
    ) -> Result<Vec<SecurityLog>> {
        self.security_log_repo().recent(filter, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    async fn store() -> Store {
        Store::new("sqlite::memory:").await.unwrap()
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Baker".to_string(),
            phone: None,
            role: Role::Customer,
            email_verified: false,
        }
    }

    #[test]
    fn timestamps_sort_lexically() {
        let a = Utc::now();
        let b = a + ChronoDuration::milliseconds(5);
        let (fa, fb) = (format_timestamp(a), format_timestamp(b));
        assert!(fa < fb);
        assert!(fa.ends_with('Z'));
        assert_eq!(
            parse_timestamp(&fa).map(|t| t.timestamp_millis()),
            Some(a.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn duplicate_email_is_reported_as_none() {
        let store = store().await;
        let now = Utc::now();

        let created = store
            .create_user(&new_user("alice@example.com"), now)
            .await
            .unwrap();
        assert!(created.is_some());

        let duplicate = store
            .create_user(&new_user("alice@example.com"), now)
            .await
            .unwrap();
        assert!(duplicate.is_none());
    }

    #[tokio::test]
    async fn failed_logins_lock_on_threshold_and_success_resets() {
        let store = store().await;
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let user = store
            .create_user(&new_user("bob@example.com"), now)
            .await
            .unwrap()
            .unwrap();

        for attempt in 1..=4 {
            let after = store
                .record_failed_login(user.id, &policy, now)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(after.failed_login_attempts, attempt);
            assert!(after.locked_until.is_none());
        }

        let fifth = store
            .record_failed_login(user.id, &policy, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fifth.failed_login_attempts, 5);
        let until = fifth.locked_until.unwrap();
        assert_eq!(
            until.timestamp_millis(),
            policy.lock_deadline(now).unwrap().timestamp_millis()
        );
        assert_eq!(store.count_locked_users(now).await.unwrap(), 1);

        store.record_successful_login(user.id, now).await.unwrap();
        let reset = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(reset.failed_login_attempts, 0);
        assert!(reset.locked_until.is_none());
        assert!(reset.last_login.is_some());
    }

    #[tokio::test]
    async fn expired_lock_is_cleared_once() {
        let store = store().await;
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let user = store
            .create_user(&new_user("carol@example.com"), now)
            .await
            .unwrap()
            .unwrap();

        for _ in 0..5 {
            store.record_failed_login(user.id, &policy, now).await.unwrap();
        }

        assert!(!store.clear_expired_lock(user.id, now).await.unwrap());

        let later = now + policy.lock_duration + ChronoDuration::seconds(1);
        assert!(store.clear_expired_lock(user.id, later).await.unwrap());
        assert!(!store.clear_expired_lock(user.id, later).await.unwrap());

        let cleared = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(cleared.failed_login_attempts, 0);
        assert!(cleared.locked_until.is_none());
    }

    #[tokio::test]
    async fn security_logs_are_listed_newest_first() {
        let store = store().await;
        let base = Utc::now();

        for (i, action) in ["failed_login", "failed_login", "successful_login"]
            .into_iter()
            .enumerate()
        {
            store
                .add_security_log(NewSecurityLog {
                    user_id: None,
                    action: action.to_string(),
                    ip_address: None,
                    user_agent: None,
                    success: action == "successful_login",
                    details: None,
                    created_at: format_timestamp(base + ChronoDuration::seconds(i as i64)),
                })
                .await
                .unwrap();
        }

        let (all, total) = store
            .get_security_logs(&SecurityLogFilter::default(), 1, 10)
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(all[0].action, "successful_login");

        let failed = SecurityLogFilter {
            action: Some("failed_login".to_string()),
            ..Default::default()
        };
        let recent = store.recent_security_logs(&failed, 1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert!(!recent[0].success);
    }
}
