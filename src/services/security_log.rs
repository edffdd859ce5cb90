//! Best-effort audit trail writer.
//!
//! [`SecurityLogger::log`] never returns an error: a failed insert is reported
//! through `tracing` and the calling auth flow carries on.

use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, warn};

use crate::clock::Clock;
use crate::db::{NewSecurityLog, SecurityLog, SecurityLogFilter, Store, format_timestamp};
use crate::domain::events::SecurityAction;
use crate::domain::{RequestContext, UserId};

#[derive(Clone)]
pub struct SecurityLogger {
    store: Store,
    clock: Arc<dyn Clock>,
}

impl SecurityLogger {
    #[must_use]
    pub fn new(store: Store, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn log(
        &self,
        user_id: Option<UserId>,
        action: SecurityAction,
        context: &RequestContext,
        success: bool,
        details: Option<Value>,
    ) {
        let details = details.and_then(|value| match serde_json::to_string(&value) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!(error = %e, %action, "Dropping unserializable security log details");
                None
            }
        });

        let entry = NewSecurityLog {
            user_id,
            action: action.as_str().to_string(),
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
            success,
            details,
            created_at: format_timestamp(self.clock.now()),
        };

        if let Err(e) = self.store.add_security_log(entry).await {
            error!(
                error = ?e,
                %action,
                user_id = user_id.map(|id| id.value()),
                success,
                "Failed to write security log"
            );
        }
    }

    pub async fn page(
        &self,
        filter: &SecurityLogFilter,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<SecurityLog>, u64)> {
        self.store.get_security_logs(filter, page, page_size).await
    }

    pub async fn recent(&self, filter: &SecurityLogFilter, limit: u64) -> Result<Vec<SecurityLog>> {
        self.store.recent_security_logs(filter, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use serde_json::json;

    #[tokio::test]
    async fn log_appends_entry_with_context() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let logger = SecurityLogger::new(store, Arc::new(SystemClock));
        let ctx = RequestContext::new(Some("10.0.0.1".into()), Some("curl/8".into()));

        logger
            .log(
                None,
                SecurityAction::FailedLogin,
                &ctx,
                false,
                Some(json!({ "reason": "user_not_found" })),
            )
            .await;

        let entries = logger
            .recent(&SecurityLogFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "failed_login");
        assert_eq!(entries[0].ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(entries[0].user_id, None);

        let details: Value = serde_json::from_str(entries[0].details.as_deref().unwrap()).unwrap();
        assert_eq!(details["reason"], "user_not_found");
    }

    #[tokio::test]
    async fn log_swallows_store_failures() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        store.conn.clone().close().await.unwrap();
        let logger = SecurityLogger::new(store, Arc::new(SystemClock));

        // Must return normally even though the insert fails.
        logger
            .log(
                Some(UserId::new(1)),
                SecurityAction::UserLogout,
                &RequestContext::default(),
                true,
                None,
            )
            .await;
    }
}
