mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::json;

use admin_api::authz::GrantLevel;
use common::{spawn_app, PASSWORD};

#[tokio::test]
async fn login_then_me_reports_effective_grants() -> Result<()> {
    let app = spawn_app().await?;
    let user = app.create_user("ada@example.com").await?;
    app.grant(user, "credit", GrantLevel::View).await?;
    app.grant_role(user, "bookkeeper", "expense", GrantLevel::Add).await?;

    let resp = app
        .send(
            Method::POST,
            "/api/v1.0/auth/login",
            None,
            Some(json!({"email": "ada@example.com", "password": PASSWORD})),
        )
        .await?;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.text());
    let data = resp.json()["data"].clone();
    assert_eq!(data["user"]["email"], "ada@example.com");
    assert!(data["user"].get("password_hash").is_none());
    let token = data["token"].as_str().unwrap().to_string();

    let resp = app.send(Method::GET, "/api/v1.0/auth/me", Some(&token), None).await?;
    assert_eq!(resp.status, StatusCode::OK);
    let access = resp.json()["data"]["access"].clone();
    assert_eq!(access["user_id"], user);
    assert_eq!(access["roles"], json!(["bookkeeper"]));
    assert_eq!(access["grants"]["credit"], json!(["VIEW"]));
    assert_eq!(access["grants"]["expense"], json!(["ADD"]));

    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() -> Result<()> {
    let app = spawn_app().await?;
    app.create_user("ada@example.com").await?;

    let wrong = app
        .send(
            Method::POST,
            "/api/v1.0/auth/login",
            None,
            Some(json!({"email": "ada@example.com", "password": "not-the-password"})),
        )
        .await?;
    let unknown = app
        .send(
            Method::POST,
            "/api/v1.0/auth/login",
            None,
            Some(json!({"email": "nobody@example.com", "password": PASSWORD})),
        )
        .await?;

    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.code(), Some(610));
    assert_eq!(wrong.json(), unknown.json());

    Ok(())
}

#[tokio::test]
async fn malformed_login_body_names_the_field() -> Result<()> {
    let app = spawn_app().await?;

    let resp = app
        .send(Method::POST, "/api/v1.0/auth/login", None, Some(json!({"email": 5, "password": "x"})))
        .await?;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.code(), Some(600));
    assert!(resp.json()["error"].as_str().unwrap().contains("email"));

    Ok(())
}

#[tokio::test]
async fn me_requires_a_token() -> Result<()> {
    let app = spawn_app().await?;
    let resp = app.send(Method::GET, "/api/v1.0/auth/me", None, None).await?;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.code(), Some(610));
    Ok(())
}
