use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{Bucket, RateLimiter};
use crate::clock::Clock;
use crate::config::Config;
use crate::domain::Role;
use crate::services::AuthService;
use crate::state::SharedState;

mod admin;
pub mod auth;
mod error;
mod observability;
mod system;
mod types;
mod validation;

pub use auth::AllowedRoles;
pub use error::{ApiError, InternalErrorDetail};
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,

    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    let rate_limiter = Arc::new(RateLimiter::new(
        &shared.config.security.rate_limit,
        Arc::clone(&shared.clock),
    ));

    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
        rate_limiter,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub async fn create_app_state_with_clock(
    config: Config,
    clock: Arc<dyn Clock>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::with_clock(config, clock).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config().server.cors_allowed_origins.clone();

    let throttle = |bucket| {
        middleware::from_fn_with_state(
            auth::Throttle::new(Arc::clone(&state.rate_limiter), bucket),
            auth::rate_limit,
        )
    };

    let api_router = Router::new()
        .route("/health", get(system::health))
        .route(
            "/auth/register",
            post(auth::register).layer(throttle(Bucket::Auth)),
        )
        .route("/auth/login", post(auth::login).layer(throttle(Bucket::Auth)))
        .route(
            "/auth/refresh",
            post(auth::refresh).layer(throttle(Bucket::Refresh)),
        )
        .merge(create_protected_router(state.clone()))
        .merge(create_admin_router(state.clone()))
        .fallback(not_found)
        .with_state(state.clone());

    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    // Outermost last
    Router::new()
        .nest("/api", api_router)
        .fallback(not_found)
        // Router::layer wraps what is already there, so innermost first
        .layer(middleware::from_fn_with_state(
            state,
            observability::error_details_middleware,
        ))
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ))
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/logout", post(auth::logout))
        .route(
            "/auth/profile",
            get(auth::get_profile).put(auth::update_profile),
        )
        .route("/auth/password", put(auth::change_password))
        .route_layer(middleware::from_fn_with_state(state, auth::authenticate))
}

fn create_admin_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/security-logs", get(admin::list_security_logs))
        .route("/admin/stats", get(admin::get_stats))
        .route("/admin/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn_with_state(
            AllowedRoles::only(&[Role::Admin]),
            auth::authorize,
        ))
        .route_layer(middleware::from_fn_with_state(state, auth::authenticate))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}
