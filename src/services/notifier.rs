//! Outbound notifications to the mailer service.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::MailerConfig;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeRecipient {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send_welcome(&self, recipient: &WelcomeRecipient) -> Result<()>;
}

/// Fires the welcome email without waiting for it. Failures are only logged.
pub fn spawn_welcome(notifier: Arc<dyn Notifier>, recipient: WelcomeRecipient) {
    tokio::spawn(async move {
        match notifier.send_welcome(&recipient).await {
            Ok(()) => debug!(email = %recipient.email, "Welcome email queued"),
            Err(e) => warn!(email = %recipient.email, error = %e, "Failed to send welcome email"),
        }
    });
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WelcomeRequest<'a> {
    user_data: &'a WelcomeRecipient,
}

pub struct HttpMailer {
    client: reqwest::Client,
    welcome_url: Url,
}

impl HttpMailer {
    pub fn new(config: &MailerConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid mailer URL: {}", config.base_url))?;
        let welcome_url = base
            .join("/api/email/welcome")
            .context("Failed to build welcome email URL")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("tortomaniya-auth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            welcome_url,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for HttpMailer {
    async fn send_welcome(&self, recipient: &WelcomeRecipient) -> Result<()> {
        self.client
            .post(self.welcome_url.clone())
            .json(&WelcomeRequest {
                user_data: recipient,
            })
            .send()
            .await
            .context("Mailer request failed")?
            .error_for_status()
            .context("Mailer rejected welcome email")?;

        Ok(())
    }
}

/// Used when the mailer is disabled.
pub struct NoopNotifier;

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn send_welcome(&self, recipient: &WelcomeRecipient) -> Result<()> {
        debug!(email = %recipient.email, "Mailer disabled, skipping welcome email");
        Ok(())
    }
}

pub fn from_config(config: &MailerConfig) -> Result<Arc<dyn Notifier>> {
    if config.enabled {
        info!(url = %config.base_url, "Welcome emails enabled");
        Ok(Arc::new(HttpMailer::new(config)?))
    } else {
        Ok(Arc::new(NoopNotifier))
    }
}
