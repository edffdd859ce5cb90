//! First-run account provisioning.

use anyhow::{Context, Result};
use std::io::Write;
use rand::distr::{Alphanumeric, SampleString};
use tracing::{info, warn};

use crate::auth::Hasher;
use crate::clock::Clock;
use crate::config::BootstrapConfig;
use crate::db::{NewUser, Store};
use crate::domain::{Role, normalize_email};

/// Creates the initial admin account when no admin exists yet.
///
/// Returns `true` if an account was created. When no password is configured
/// a random one is generated and written to stderr exactly once; the log only
/// records that it happened.
pub async fn ensure_admin(
    store: &Store,
    hasher: &Hasher,
    config: &BootstrapConfig,
    clock: &dyn Clock,
) -> Result<bool> {
    if store.has_user_with_role(Role::Admin).await? {
        return Ok(false);
    }

    let (password, generated) = match config.admin_password.as_deref() {
        Some(password) if !password.is_empty() => (password.to_string(), false),
        _ => (generate_password(), true),
    };

    let password_hash = hasher
        .hash_blocking(&password)
        .await
        .context("Failed to hash bootstrap admin password")?;

    let email = normalize_email(&config.admin_email);
    let created = store
        .create_user(
            &NewUser {
                email: email.clone(),
                password_hash,
                first_name: config.admin_first_name.clone(),
                last_name: config.admin_last_name.clone(),
                phone: None,
                role: Role::Admin,
                email_verified: true,
            },
            clock.now(),
        )
        .await?;

    if created.is_none() {
        warn!(%email, "Bootstrap admin email belongs to an existing non-admin account, skipping");
        return Ok(false);
    }

    if generated {
        warn!(%email, "Created admin account with a generated password. Change it after first login");
        if let Err(e) = announce_generated_password(&mut std::io::stderr().lock(), &email, &password)
        {
            warn!(error = %e, "Failed to print generated admin password");
        }
    } else {
        info!(%email, "Created admin account");
    }

    Ok(true)
}

fn announce_generated_password(
    out: &mut impl Write,
    email: &str,
    password: &str,
) -> std::io::Result<()> {
    writeln!(out, "Generated admin credentials (shown once):")?;
    writeln!(out, "  email:    {email}")?;
    writeln!(out, "  password: {password}")
}

/// Random password that satisfies the registration policy.
fn generate_password() -> String {
    let body = Alphanumeric.sample_string(&mut rand::rng(), 20);
    format!("{body}Aa1!")
}
