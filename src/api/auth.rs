use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts, Request, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use super::validation::Validator;
use super::{
    ApiError, ApiResponse, AppState, AuthPayload, ChangePasswordRequest, LoginRequest,
    ProfilePayload, RefreshRequest, RegisterRequest, TokenPayload, UpdateProfileRequest,
};
use crate::auth::{Bucket, Decision, RateLimiter};
use crate::constants::tokens::BEARER_PREFIX;
use crate::domain::{RequestContext, Role};
use crate::services::{AuthSession, AuthUser, ProfileUpdate, Registration};

// ============================================================================
// Extractors
// ============================================================================

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(ApiError::authentication_required)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let ip_address = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        Ok(Self::new(ip_address, user_agent))
    }
}

/// Pulls the token out of `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// ============================================================================
// Middleware
// ============================================================================

/// Rejects requests without a valid access token for an active, unlocked
/// account and attaches the resolved [`AuthUser`] for handlers.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers()).ok_or_else(ApiError::authentication_required)?;

    let user = state.auth().authenticate(token).await?;

    tracing::Span::current().record("user_id", user.id.value());
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Limiter handle and the budget a route draws from.
#[derive(Debug, Clone)]
pub struct Throttle {
    limiter: Arc<RateLimiter>,
    bucket: Bucket,
}

impl Throttle {
    #[must_use]
    pub const fn new(limiter: Arc<RateLimiter>, bucket: Bucket) -> Self {
        Self { limiter, bucket }
    }
}

/// Refuses clients that have spent their budget, keyed by client address.
pub async fn rate_limit(
    State(throttle): State<Throttle>,
    context: RequestContext,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = context.ip_address.as_deref().unwrap_or("unknown");

    match throttle.limiter.check(throttle.bucket, client).await {
        Decision::Allowed { .. } => Ok(next.run(request).await),
        Decision::Limited { retry_after_secs } => {
            metrics::counter!("auth_rate_limited_total", "bucket" => throttle.bucket.as_str())
                .increment(1);
            tracing::warn!(
                client,
                bucket = throttle.bucket.as_str(),
                retry_after_secs,
                "Rate limit exceeded"
            );
            Err(ApiError::RateLimited { retry_after_secs })
        }
    }
}

/// Roles admitted by [`authorize`]. Empty means any authenticated role.
#[derive(Debug, Clone, Default)]
pub struct AllowedRoles(Arc<[Role]>);

impl AllowedRoles {
    #[must_use]
    pub fn only(roles: &[Role]) -> Self {
        Self(Arc::from(roles))
    }

    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn permits(&self, role: Role) -> bool {
        self.0.is_empty() || self.0.contains(&role)
    }
}

/// Must run after [`authenticate`].
pub async fn authorize(
    State(allowed): State<AllowedRoles>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(ApiError::authentication_required)?;

    if !allowed.permits(user.role) {
        tracing::warn!(user_id = %user.id, role = %user.role, "Insufficient privileges");
        return Err(ApiError::insufficient_privileges());
    }

    Ok(next.run(request).await)
}

// ============================================================================
// Handlers
// ============================================================================

fn auth_payload(session: AuthSession) -> AuthPayload {
    AuthPayload {
        user: session.user,
        token: session.tokens.access_token,
        refresh_token: session.tokens.refresh_token,
    }
}

/// POST /auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    context: RequestContext,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;

    Validator::new()
        .email("email", &payload.email)
        .password("password", &payload.password)
        .name("firstName", &payload.first_name)
        .name("lastName", &payload.last_name)
        .phone("phone", payload.phone.as_deref())
        .finish()?;

    let session = state
        .auth()
        .register(
            Registration {
                email: payload.email,
                password: payload.password,
                first_name: payload.first_name,
                last_name: payload.last_name,
                phone: payload.phone,
            },
            &context,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            auth_payload(session),
            "User registered successfully",
        )),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    context: RequestContext,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AuthPayload>>, ApiError> {
    let Json(payload) = payload?;

    Validator::new()
        .email("email", &payload.email)
        .required("password", &payload.password, "Password is required")
        .finish()?;

    let session = state
        .auth()
        .login(&payload.email, &payload.password, &context)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        auth_payload(session),
        "Login successful",
    )))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    context: RequestContext,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<TokenPayload>>, ApiError> {
    let Json(payload) = payload?;

    let Some(refresh_token) = payload.refresh_token.filter(|t| !t.is_empty()) else {
        return Err(ApiError::validation("Refresh token is required"));
    };

    let tokens = state.auth().refresh(&refresh_token, &context).await?;

    Ok(Json(ApiResponse::success(TokenPayload {
        token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    })))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    context: RequestContext,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.auth().logout(&user, &context).await?;
    Ok(Json(ApiResponse::message("Logged out successfully")))
}

/// GET /auth/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<ApiResponse<ProfilePayload>>, ApiError> {
    let profile = state.auth().profile(user.id).await?;
    Ok(Json(ApiResponse::success(ProfilePayload { user: profile })))
}

/// PUT /auth/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    context: RequestContext,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ProfilePayload>>, ApiError> {
    let Json(payload) = payload?;

    Validator::new()
        .name("firstName", &payload.first_name)
        .name("lastName", &payload.last_name)
        .phone("phone", payload.phone.as_deref())
        .date("birthDate", payload.birth_date.as_deref())
        .finish()?;

    let profile = state
        .auth()
        .update_profile(
            user.id,
            ProfileUpdate {
                first_name: payload.first_name,
                last_name: payload.last_name,
                phone: payload.phone,
                address: payload.address,
                birth_date: payload.birth_date,
            },
            &context,
        )
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        ProfilePayload { user: profile },
        "Profile updated successfully",
    )))
}

/// PUT /auth/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    context: RequestContext,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let Json(payload) = payload?;

    Validator::new()
        .required(
            "currentPassword",
            &payload.current_password,
            "Current password is required",
        )
        .password("newPassword", &payload.new_password)
        .finish()?;

    state
        .auth()
        .change_password(
            user.id,
            &payload.current_password,
            &payload.new_password,
            &context,
        )
        .await?;

    Ok(Json(ApiResponse::message("Password changed successfully")))
}
