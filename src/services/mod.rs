pub mod auth_service;
pub use auth_service::{
    AccountStats, AuthError, AuthService, AuthSession, AuthUser, ProfileUpdate, Registration,
    UserProfile,
};

pub mod auth_service_impl;
pub use auth_service_impl::SeaOrmAuthService;

pub mod bootstrap;

pub mod notifier;
pub use notifier::{HttpMailer, NoopNotifier, Notifier, WelcomeRecipient};

pub mod security_log;
pub use security_log::SecurityLogger;
