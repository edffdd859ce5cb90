use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::auth::token::parse_ttl;
use crate::constants::limits::MAX_LIFETIME_SECS;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub security: SecurityConfig,

    pub bootstrap: BootstrapConfig,

    pub mailer: MailerConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    #[must_use]
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,

    /// `development` adds internal error details to 500 responses.
    pub environment: Environment,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/tortomaniya.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
            environment: Environment::Production,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3002,
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:4000".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://127.0.0.1:4000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub password: PasswordConfig,

    pub jwt: JwtConfig,

    pub lockout: LockoutConfig,

    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Work factor: Argon2id time cost (iterations).
    pub cost: u32,

    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub memory_cost_kib: u32,

    /// Argon2 parallelism (default: 1)
    pub parallelism: u32,

    /// Re-hash stored digests with the current parameters after a successful login.
    pub rehash_on_login: bool,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            cost: 12,
            memory_cost_kib: 8192,
            parallelism: 1,
            rehash_on_login: true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// HMAC signing secret. Never logged or serialized back to clients.
    pub secret: String,

    /// Access token lifetime, e.g. "7d", "12h", "900s".
    pub access_ttl: String,

    /// Refresh token lifetime.
    pub refresh_ttl: String,

    pub issuer: String,

    pub audience: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            access_ttl: "7d".to_string(),
            refresh_ttl: "30d".to_string(),
            issuer: crate::constants::tokens::ISSUER.to_string(),
            audience: crate::constants::tokens::AUDIENCE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Consecutive failed logins before the account is locked.
    pub max_failed_attempts: u32,

    /// How long a lock lasts once triggered.
    pub lock_duration_seconds: u64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lock_duration_seconds: 15 * 60,
        }
    }
}

/// Per-IP request budgets for the unauthenticated auth endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Length of one counting window.
    pub window_seconds: u64,

    /// Requests per window shared by register and login.
    pub auth_max_requests: u32,

    /// Requests per window for token refresh.
    pub refresh_max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_seconds: 15 * 60,
            // Leaves room to reach the account lock from one address.
            auth_max_requests: 20,
            refresh_max_requests: 100,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub admin_email: String,

    /// When empty a random password is generated and logged once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<String>,

    pub admin_first_name: String,

    pub admin_last_name: String,
}

impl std::fmt::Debug for BootstrapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapConfig")
            .field("admin_email", &self.admin_email)
            .field(
                "admin_password",
                &self.admin_password.as_ref().map(|_| "<redacted>"),
            )
            .finish_non_exhaustive()
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            admin_email: "admin@tortomaniya.bg".to_string(),
            admin_password: None,
            admin_first_name: "Administrator".to_string(),
            admin_last_name: "Tortomaniya".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailerConfig {
    pub enabled: bool,

    pub base_url: String,

    pub timeout_seconds: u64,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:3001".to_string(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            bootstrap: BootstrapConfig::default(),
            mailer: MailerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Loads the first config file found, then applies environment overrides.
    pub fn load() -> Result<Self> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();

        let mut config = Self::load_file()?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        for path in &Self::config_paths() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Applies overrides from a key lookup (the process environment in production).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("JWT_SECRET") {
            self.security.jwt.secret = secret;
        }
        if let Some(ttl) = lookup("JWT_EXPIRES_IN") {
            self.security.jwt.access_ttl = ttl;
        }
        if let Some(ttl) = lookup("JWT_REFRESH_EXPIRES_IN") {
            self.security.jwt.refresh_ttl = ttl;
        }
        if let Some(cost) = lookup("PASSWORD_HASH_COST") {
            self.security.password.cost = cost
                .parse()
                .with_context(|| format!("Invalid PASSWORD_HASH_COST: {cost}"))?;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.general.database_path = url;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT: {port}"))?;
        }
        if let Some(env) = lookup("APP_ENV") {
            self.general.environment = match env.to_ascii_lowercase().as_str() {
                "development" | "dev" => Environment::Development,
                "production" | "prod" => Environment::Production,
                other => anyhow::bail!("Invalid APP_ENV: {other}"),
            };
        }
        if let Some(url) = lookup("MAILER_URL") {
            self.mailer.base_url = url;
        }
        Ok(())
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("tortomaniya").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".tortomaniya").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        let jwt = &self.security.jwt;

        if jwt.secret.is_empty() {
            if self.general.environment.is_development() {
                warn!("JWT secret is empty; tokens are signed with an empty key");
            } else {
                anyhow::bail!("JWT secret must be set in production (security.jwt.secret or JWT_SECRET)");
            }
        } else if jwt.secret.len() < 32 && !self.general.environment.is_development() {
            anyhow::bail!("JWT secret must be at least 32 bytes in production");
        }

        for (name, ttl) in [("access", &jwt.access_ttl), ("refresh", &jwt.refresh_ttl)] {
            let parsed = parse_ttl(ttl)
                .with_context(|| format!("Invalid {name} token TTL: {ttl}"))?;
            if parsed.num_seconds() > MAX_LIFETIME_SECS {
                anyhow::bail!("{name} token TTL {ttl} exceeds the ten-year maximum");
            }
        }

        let lockout = &self.security.lockout;
        if lockout.max_failed_attempts == 0 {
            anyhow::bail!("lockout.max_failed_attempts must be > 0");
        }
        if i64::try_from(lockout.lock_duration_seconds).map_or(true, |s| s > MAX_LIFETIME_SECS) {
            anyhow::bail!(
                "lockout.lock_duration_seconds must be at most {MAX_LIFETIME_SECS}"
            );
        }

        let rate_limit = &self.security.rate_limit;
        if rate_limit.enabled {
            if rate_limit.window_seconds == 0
                || i64::try_from(rate_limit.window_seconds).map_or(true, |s| s > MAX_LIFETIME_SECS)
            {
                anyhow::bail!("rate_limit.window_seconds must be between 1 and {MAX_LIFETIME_SECS}");
            }
            if rate_limit.auth_max_requests == 0 || rate_limit.refresh_max_requests == 0 {
                anyhow::bail!("rate_limit request budgets must be > 0");
            }
        }

        let password = &self.security.password;
        argon2::Params::new(
            password.memory_cost_kib,
            password.cost,
            password.parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid password hashing parameters: {e}"))?;

        if self.mailer.enabled && self.mailer.base_url.is_empty() {
            anyhow::bail!("Mailer URL cannot be empty when enabled");
        }

        Ok(())
    }
}
