mod common;

use axum::http::StatusCode;
use common::{PASSWORD, spawn_app};
use serde_json::json;

const EMAIL: &str = "alice@example.com";

#[tokio::test]
async fn test_disabled_account_cannot_log_in() {
    let app = spawn_app().await;
    app.register(EMAIL).await;
    app.deactivate(EMAIL).await;

    let (status, body) = app.login(EMAIL, PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "ACCOUNT_DISABLED");

    // A wrong password gets the same answer and is not counted
    let (status, body) = app.login(EMAIL, "Wrong123!").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "ACCOUNT_DISABLED");

    let user = app.state.store().get_user_by_email(EMAIL).await.unwrap().unwrap();
    assert_eq!(user.failed_login_attempts, 0);
    assert!(user.locked_until.is_none());
    assert!(user.last_login.is_none());

    // Nothing beyond the registration was recorded for the account
    let admin = app.admin_token().await;
    let (status, body) = app
        .send(
            "GET",
            &format!("/api/admin/security-logs?user_id={}", user.id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["action"], "user_registration");

    let (_, body) = app
        .send(
            "GET",
            "/api/admin/security-logs?action=failed_login",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn test_disabled_account_access_token_is_rejected() {
    let app = spawn_app().await;
    let token = app.customer_token(EMAIL).await;

    let (status, _) = app.send("GET", "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    app.deactivate(EMAIL).await;

    let (status, body) = app.send("GET", "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "USER_NOT_FOUND");
}

#[tokio::test]
async fn test_disabled_account_refresh_is_rejected() {
    let app = spawn_app().await;
    let (status, body) = app.register(EMAIL).await;
    assert_eq!(status, StatusCode::CREATED);
    let refresh_token = body["data"]["refreshToken"].as_str().unwrap().to_string();

    app.deactivate(EMAIL).await;

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({ "refreshToken": refresh_token })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_REFRESH_TOKEN");
}
