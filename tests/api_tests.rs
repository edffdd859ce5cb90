mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Duration;
use common::{ADMIN_EMAIL, PASSWORD, spawn_app};
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn test_register_returns_token_pair() {
    let app = spawn_app().await;

    let (status, body) = app.register("alice@example.com").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "User registered successfully");
    assert!(!body["data"]["token"].as_str().unwrap().is_empty());
    assert!(!body["data"]["refreshToken"].as_str().unwrap().is_empty());
    assert_eq!(body["data"]["user"]["email"], "alice@example.com");
    assert_eq!(body["data"]["user"]["role"], "customer");
    assert!(body["data"]["user"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_register_rejects_duplicate_email_case_insensitively() {
    let app = spawn_app().await;
    app.register("alice@example.com").await;

    let (status, body) = app.register("  ALICE@Example.com ").await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "EMAIL_ALREADY_EXISTS");
}

#[tokio::test]
async fn test_register_reports_every_invalid_field() {
    let app = spawn_app().await;

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "email": "nope",
                "password": "short",
                "firstName": "A",
                "lastName": "Baker",
                "phone": "555-1234",
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, ["email", "password", "firstName", "phone"]);
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_error() {
    let app = spawn_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_with_wrong_password_is_generic() {
    let app = spawn_app().await;
    app.register("alice@example.com").await;

    let (status, body) = app.login("alice@example.com", "Wrong123!").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
    assert_eq!(body["error"], "Invalid email or password");
}

#[tokio::test]
async fn test_unknown_email_is_indistinguishable_and_audited() {
    let app = spawn_app().await;
    app.register("alice@example.com").await;

    let (_, known) = app.login("alice@example.com", "Wrong123!").await;
    let (status, unknown) = app.login("ghost@example.com", "Wrong123!").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown["code"], "INVALID_CREDENTIALS");
    assert_eq!(unknown["error"], known["error"]);

    let admin = app.admin_token().await;
    let (status, body) = app
        .send(
            "GET",
            "/api/admin/security-logs?action=failed_login",
            Some(&admin),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let entry = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["details"]["reason"] == "user_not_found")
        .expect("failed_login entry for unknown email");
    assert!(entry["userId"].is_null());
    assert_eq!(entry["success"], false);
    assert_eq!(entry["ipAddress"], "203.0.113.7");
    assert_eq!(entry["userAgent"], "integration-tests");
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let app = spawn_app().await;

    let (status, body) = app.send("GET", "/api/auth/profile", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTHENTICATION_REQUIRED");
}

#[tokio::test]
async fn test_expired_token_differs_from_malformed_token() {
    let app = spawn_app().await;
    let token = app.customer_token("alice@example.com").await;

    let (status, body) = app
        .send("GET", "/api/auth/profile", Some("not.a.token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_TOKEN");

    app.clock.advance(Duration::hours(2));

    let (status, body) = app.send("GET", "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_EXPIRED");
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let app = spawn_app().await;
    let (_, body) = app.register("alice@example.com").await;
    let refresh = body["data"]["refreshToken"].as_str().unwrap();

    let (status, body) = app.send("GET", "/api/auth/profile", Some(refresh), None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_refresh_issues_new_pair() {
    let app = spawn_app().await;
    let (_, body) = app.register("alice@example.com").await;
    let access = body["data"]["token"].as_str().unwrap().to_string();
    let refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();

    // Access token expired, refresh token still valid
    app.clock.advance(Duration::hours(2));

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({ "refreshToken": refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_access = body["data"]["token"].as_str().unwrap();
    assert_ne!(new_access, access);
    assert!(!body["data"]["refreshToken"].as_str().unwrap().is_empty());

    let (status, _) = app.send("GET", "/api/auth/profile", Some(new_access), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({ "refreshToken": access })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_REFRESH_TOKEN");

    let (status, body) = app
        .send("POST", "/api/auth/refresh", None, Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_profile_read_and_update() {
    let app = spawn_app().await;
    let token = app.customer_token("alice@example.com").await;

    let (status, body) = app.send("GET", "/api/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["firstName"], "Alice");
    assert!(body["data"]["user"]["memberSince"].is_string());

    let (status, body) = app
        .send(
            "PUT",
            "/api/auth/profile",
            Some(&token),
            Some(json!({
                "firstName": "Alicia",
                "lastName": "Baker",
                "phone": "+359888123456",
                "address": "  1 Cake Street, Sofia  ",
                "birthDate": "1990-04-01",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["firstName"], "Alicia");
    assert_eq!(body["data"]["user"]["address"], "1 Cake Street, Sofia");
    assert_eq!(body["data"]["user"]["birthDate"], "1990-04-01");

    let (status, body) = app
        .send(
            "PUT",
            "/api/auth/profile",
            Some(&token),
            Some(json!({
                "firstName": "Alicia",
                "lastName": "Baker",
                "birthDate": "01.04.1990",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "birthDate");
}

#[tokio::test]
async fn test_change_password() {
    let app = spawn_app().await;
    let token = app.customer_token("alice@example.com").await;

    let (status, body) = app
        .send(
            "PUT",
            "/api/auth/password",
            Some(&token),
            Some(json!({ "currentPassword": "Wrong123!", "newPassword": "Fresh456?" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Current password is incorrect");

    let (status, _) = app
        .send(
            "PUT",
            "/api/auth/password",
            Some(&token),
            Some(json!({ "currentPassword": PASSWORD, "newPassword": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "PUT",
            "/api/auth/password",
            Some(&token),
            Some(json!({ "currentPassword": PASSWORD, "newPassword": "Fresh456?" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.login("alice@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.login("alice@example.com", "Fresh456?").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_is_audited() {
    let app = spawn_app().await;
    let token = app.customer_token("alice@example.com").await;

    let (status, body) = app.send("POST", "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out successfully");

    let admin = app.admin_token().await;
    let (_, body) = app
        .send(
            "GET",
            "/api/admin/security-logs?action=user_logout",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = spawn_app().await;
    let customer = app.customer_token("alice@example.com").await;

    for uri in ["/api/admin/stats", "/api/admin/security-logs", "/api/admin/metrics"] {
        let (status, body) = app.send("GET", uri, Some(&customer), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(body["code"], "INSUFFICIENT_PRIVILEGES");

        let (status, _) = app.send("GET", uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn test_admin_stats_and_log_paging() {
    let app = spawn_app().await;
    app.register("alice@example.com").await;
    app.register("bob@example.com").await;
    let admin = app.admin_token().await;

    let (status, body) = app.send("GET", "/api/admin/stats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalUsers"], 3);
    assert_eq!(body["data"]["activeUsers"], 3);
    assert_eq!(body["data"]["lockedAccounts"], 0);

    // Two registrations plus the admin login
    let (status, body) = app
        .send("GET", "/api/admin/security-logs?page=1&page_size=2", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["totalPages"], 2);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["items"][0]["action"], "successful_login");

    let (status, _) = app
        .send("GET", "/api/admin/security-logs?page=0", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_security_logs_reject_negative_user_id() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let (status, body) = app
        .send("GET", "/api/admin/security-logs?user_id=-1", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    // The server keeps answering afterwards
    let (status, body) = app
        .send("GET", "/api/admin/security-logs?user_id=1", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn test_admin_metrics_without_recorder() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/metrics")
                .header("authorization", format!("Bearer {admin}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_and_security_headers() {
    let app = spawn_app().await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("strict-transport-security"));
    assert!(headers.contains_key("content-security-policy"));

    let (_, body) = app.send("GET", "/api/health", None, None).await;
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], true);
    assert_eq!(body["data"]["environment"], "development");
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = spawn_app().await;

    let (status, body) = app.send("GET", "/api/nothing-here", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_bootstrap_admin_can_log_in_once_created() {
    let app = spawn_app().await;

    assert!(!app.state.shared.bootstrap().await.unwrap());

    let (status, body) = app.login(ADMIN_EMAIL, common::ADMIN_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["role"], "admin");
}
