use anyhow::{Context, Result};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Select, Set,
};

use crate::domain::UserId;
use crate::entities::{prelude::*, security_logs};

/// One row to append to the audit trail.
#[derive(Debug, Clone)]
pub struct NewSecurityLog {
    pub user_id: Option<UserId>,
    pub action: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub details: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct SecurityLogFilter {
    pub user_id: Option<UserId>,
    pub action: Option<String>,
}

/// Append-only: rows are never updated or deleted.
pub struct SecurityLogRepository {
    conn: DatabaseConnection,
}

impl SecurityLogRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, entry: NewSecurityLog) -> Result<i64> {
        let active_model = security_logs::ActiveModel {
            user_id: Set(entry.user_id.map(|id| id.value())),
            action: Set(entry.action),
            ip_address: Set(entry.ip_address),
            user_agent: Set(entry.user_agent),
            success: Set(entry.success),
            details: Set(entry.details),
            created_at: Set(entry.created_at),
            ..Default::default()
        };

        let result = SecurityLogs::insert(active_model)
            .exec(&self.conn)
            .await
            .context("Failed to insert security log")?;

        Ok(result.last_insert_id)
    }

    fn filtered(filter: &SecurityLogFilter) -> Select<SecurityLogs> {
        let mut query = SecurityLogs::find()
            .order_by_desc(security_logs::Column::CreatedAt)
            .order_by_desc(security_logs::Column::Id);

        if let Some(user_id) = filter.user_id {
            query = query.filter(security_logs::Column::UserId.eq(user_id.value()));
        }

        if let Some(action) = &filter.action {
            query = query.filter(security_logs::Column::Action.eq(action.as_str()));
        }

        query
    }

    /// Newest first. `page` is 1-based. Returns the page and the total row count.
    pub async fn list(
        &self,
        filter: &SecurityLogFilter,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<security_logs::Model>, u64)> {
        let paginator = Self::filtered(filter).paginate(&self.conn, page_size.max(1));
        let total = paginator
            .num_items()
            .await
            .context("Failed to count security logs")?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .context("Failed to fetch security logs")?;

        Ok((items, total))
    }

    pub async fn recent(
        &self,
        filter: &SecurityLogFilter,
        limit: u64,
    ) -> Result<Vec<security_logs::Model>> {
        Self::filtered(filter)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to fetch recent security logs")
    }
}
