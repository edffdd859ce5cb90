#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use sea_orm::ConnectionTrait;
use serde_json::{Value, json};
use std::sync::Arc;
use tortomaniya_auth::api::{self, AppState};
use tortomaniya_auth::clock::ManualClock;
use tortomaniya_auth::config::{Config, Environment};
use tower::ServiceExt;

pub const ADMIN_EMAIL: &str = "admin@tortomaniya.bg";
pub const ADMIN_PASSWORD: &str = "AdminPass1!";
pub const PASSWORD: &str = "Secret123!";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub clock: ManualClock,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.general.environment = Environment::Development;
    config.security.password.cost = 1;
    config.security.password.memory_cost_kib = 1024;
    config.security.jwt.secret = "integration-test-secret-with-enough-bytes".to_string();
    config.security.jwt.access_ttl = "1h".to_string();
    config.security.jwt.refresh_ttl = "1d".to_string();
    config.bootstrap.admin_password = Some(ADMIN_PASSWORD.to_string());
    config.mailer.enabled = false;
    config.observability.metrics_enabled = false;
    config.security.rate_limit.enabled = false;
    config
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: Config) -> TestApp {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());

    let state = api::create_app_state_with_clock(config, Arc::new(clock.clone()), None)
        .await
        .expect("Failed to create app state");
    state.shared.bootstrap().await.expect("Failed to bootstrap admin");

    TestApp {
        router: api::router(state.clone()),
        state,
        clock,
    }
}

impl TestApp {
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::USER_AGENT, "integration-tests")
            .header("x-forwarded-for", "203.0.113.7");

        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, json)
    }

    pub async fn register(&self, email: &str) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "email": email,
                "password": PASSWORD,
                "firstName": "Alice",
                "lastName": "Baker",
            })),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    /// Registers an account and returns its access token.
    pub async fn customer_token(&self, email: &str) -> String {
        let (status, body) = self.register(email).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["token"].as_str().unwrap().to_string()
    }

    /// Flips `is_active` off for an account, as an operator would in the database.
    pub async fn deactivate(&self, email: &str) {
        self.state
            .store()
            .conn
            .execute_unprepared(&format!(
                "UPDATE users SET is_active = 0 WHERE email = '{email}'"
            ))
            .await
            .unwrap();
    }

    pub async fn admin_token(&self) -> String {
        let (status, body) = self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["token"].as_str().unwrap().to_string()
    }
}
