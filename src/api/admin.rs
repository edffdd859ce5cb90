use axum::{
    Json,
    extract::{Query, State},
};
use std::sync::Arc;

use super::validation::{validate_page, validate_page_size, validate_user_id};
use super::{ApiError, ApiResponse, AppState, PaginatedResponse, SecurityLogDto, SecurityLogQuery};
use crate::db::SecurityLogFilter;
use crate::services::AccountStats;

const DEFAULT_PAGE_SIZE: u64 = 50;

/// GET /admin/security-logs
pub async fn list_security_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SecurityLogQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<SecurityLogDto>>>, ApiError> {
    let page = validate_page(query.page)?;
    let page_size = validate_page_size(query.page_size, DEFAULT_PAGE_SIZE)?;

    let filter = SecurityLogFilter {
        user_id: validate_user_id(query.user_id)?,
        action: query.action.filter(|a| !a.trim().is_empty()),
    };

    let (entries, total) = state
        .shared
        .security_log
        .page(&filter, page, page_size)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: entries.into_iter().map(SecurityLogDto::from).collect(),
        total,
        page,
        page_size,
        total_pages: total.div_ceil(page_size),
    })))
}

/// GET /admin/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<AccountStats>>, ApiError> {
    let stats = state.auth().stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}
