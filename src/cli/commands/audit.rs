use std::sync::Arc;

use crate::clock::SystemClock;
use crate::config::Config;
use crate::db::{SecurityLogFilter, Store};
use crate::domain::UserId;
use crate::services::SecurityLogger;

pub async fn cmd_audit(
    config: &Config,
    user: Option<i32>,
    limit: u64,
    action: Option<String>,
) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let logger = SecurityLogger::new(store, Arc::new(SystemClock));

    let filter = SecurityLogFilter {
        user_id: user.map(UserId::new),
        action,
    };
    let entries = logger.recent(&filter, limit).await?;

    if entries.is_empty() {
        println!("No security events.");
        return Ok(());
    }

    println!("Recent security events (last {}):", entries.len());
    println!("{:-<78}", "");

    for entry in entries {
        let status = if entry.success { "ok" } else { "FAILED" };
        let user = entry
            .user_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());

        println!(
            "{} {:<18} {:<6} user={} ip={}",
            entry.created_at,
            entry.action,
            status,
            user,
            entry.ip_address.as_deref().unwrap_or("-"),
        );
        if let Some(details) = entry.details {
            println!("  {details}");
        }
    }

    Ok(())
}
