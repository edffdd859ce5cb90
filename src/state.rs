use anyhow::Context;
use std::sync::Arc;

use crate::auth::{Hasher, LockoutPolicy, TokenIssuer};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::Store;
use crate::services::{AuthService, SeaOrmAuthService, SecurityLogger, bootstrap, notifier};
use crate::services::Notifier;

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub clock: Arc<dyn Clock>,

    pub tokens: Arc<TokenIssuer>,

    pub hasher: Hasher,

    pub lockout: LockoutPolicy,

    pub security_log: SecurityLogger,

    pub notifier: Arc<dyn Notifier>,

    pub auth_service: Arc<dyn AuthService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Builds the state around an explicit time source (tests pass a manual clock).
    pub async fn with_clock(config: Config, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let notifier = notifier::from_config(&config.mailer)?;
        Self::assemble(config, store, clock, notifier)
    }

    /// Wires the services over an already-open store.
    pub fn assemble(
        config: Config,
        store: Store,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let hasher =
            Hasher::new(&config.security.password).context("Invalid password hashing config")?;
        let tokens = Arc::new(TokenIssuer::new(&config.security.jwt, Arc::clone(&clock))?);
        let lockout = LockoutPolicy::from_config(&config.security.lockout);
        let security_log = SecurityLogger::new(store.clone(), Arc::clone(&clock));

        let auth_service = Arc::new(
            SeaOrmAuthService::new(
                store.clone(),
                hasher.clone(),
                Arc::clone(&tokens),
                lockout,
                security_log.clone(),
                Arc::clone(&notifier),
                Arc::clone(&clock),
            )
            .with_rehash_on_login(config.security.password.rehash_on_login),
        ) as Arc<dyn AuthService>;

        Ok(Self {
            config: Arc::new(config),
            store,
            clock,
            tokens,
            hasher,
            lockout,
            security_log,
            notifier,
            auth_service,
        })
    }

    /// Creates the initial admin account if none exists.
    pub async fn bootstrap(&self) -> anyhow::Result<bool> {
        bootstrap::ensure_admin(
            &self.store,
            &self.hasher,
            &self.config.bootstrap,
            self.clock.as_ref(),
        )
        .await
    }
}
