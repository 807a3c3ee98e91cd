mod common;

use anyhow::Result;
use axum::http::{header, Method, StatusCode};
use serde_json::json;

use admin_api::authz::GrantLevel;
use common::{spawn_app, TestApp};

const CREDITS_SUMMARY: &str = "/api/v1.0/admin/report/finance/credits-summary";

async fn seed_credits(app: &TestApp) -> Result<()> {
    let root = app.token(app.create_super_admin("root@example.com").await?);
    for (name, amount, currency, active) in [
        ("a", 10.0, "EUR", true),
        ("b", 5.0, "EUR", false),
        ("c", 7.0, "USD", true),
    ] {
        let resp = app
            .send(
                Method::POST,
                "/api/v1.0/admin/credit",
                Some(&root),
                Some(json!({"name": name, "amount": amount, "currency": currency, "active": active})),
            )
            .await?;
        assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.text());
    }
    Ok(())
}

async fn analyst(app: &TestApp) -> Result<String> {
    let user = app.create_user("analyst@example.com").await?;
    app.grant(user, "report", GrantLevel::View).await?;
    app.grant(user, "credit", GrantLevel::View).await?;
    Ok(app.token(user))
}

#[tokio::test]
async fn catalogue_requires_report_grant() -> Result<()> {
    let app = spawn_app().await?;
    let outsider = app.token(app.create_user("outsider@example.com").await?);

    let resp = app
        .send(Method::GET, "/api/v1.0/admin/report/list", Some(&outsider), None)
        .await?;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let token = analyst(&app).await?;
    let resp = app.send(Method::GET, "/api/v1.0/admin/report/list", Some(&token), None).await?;
    assert_eq!(resp.status, StatusCode::OK);
    let reports = resp.json()["data"].as_array().cloned().unwrap();
    assert_eq!(reports.len(), 3);
    assert!(reports
        .iter()
        .any(|r| r["group"] == "finance" && r["alias"] == "credits-summary"));

    Ok(())
}

#[tokio::test]
async fn render_applies_filters_and_logs() -> Result<()> {
    let app = spawn_app().await?;
    seed_credits(&app).await?;
    let token = analyst(&app).await?;

    let resp = app
        .send(Method::GET, &format!("{CREDITS_SUMMARY}?active=true"), Some(&token), None)
        .await?;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.text());
    let data = resp.json()["data"].clone();
    assert_eq!(data["columns"], json!(["currency", "credits", "total"]));
    assert_eq!(
        data["rows"],
        json!([
            {"currency": "EUR", "credits": 1, "total": 10.0},
            {"currency": "USD", "credits": 1, "total": 7.0}
        ])
    );

    let resp = app
        .send(Method::GET, &format!("{CREDITS_SUMMARY}?format=csv"), Some(&token), None)
        .await?;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.text(), "currency,credits,total\r\nEUR,2,15.0\r\nUSD,1,7.0\r\n");

    let logged: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM report_logs WHERE alias = 'credits-summary' AND from_csv_hash = 0")
            .fetch_one(&app.pool)
            .await?;
    assert_eq!(logged, 2);

    let resp = app
        .send(Method::GET, &format!("{CREDITS_SUMMARY}?active=maybe"), Some(&token), None)
        .await?;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn render_checks_the_report_grant_and_name() -> Result<()> {
    let app = spawn_app().await?;
    let user = app.create_user("reporter@example.com").await?;
    app.grant(user, "report", GrantLevel::View).await?;
    let token = app.token(user);

    // report:VIEW alone does not expose credit data
    let resp = app.send(Method::GET, CREDITS_SUMMARY, Some(&token), None).await?;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.code(), Some(611));

    let resp = app
        .send(Method::GET, "/api/v1.0/admin/report/finance/nope", Some(&token), None)
        .await?;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.code(), Some(627));

    let resp = app.send(Method::GET, CREDITS_SUMMARY, None, None).await?;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn csv_link_is_valid_until_its_expiry_second() -> Result<()> {
    let app = spawn_app().await?;
    seed_credits(&app).await?;
    let token = analyst(&app).await?;

    let resp = app
        .send(
            Method::POST,
            &format!("{CREDITS_SUMMARY}/csv-link?currency=EUR&format=json"),
            Some(&token),
            None,
        )
        .await?;
    assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.text());
    let link = resp.json()["data"].clone();
    let hash = link["hash"].as_str().unwrap().to_string();
    let url = link["url"].as_str().unwrap().to_string();
    assert_eq!(url, format!("/api/v1.0/report/csv-view/{hash}"));
    assert_eq!(link["expires_at"], "2025-06-01T13:00:00Z");

    // one second before expiry, no token needed
    app.clock.advance(3599);
    let resp = app.send(Method::GET, &url, None, None).await?;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.text());
    assert!(resp.headers[header::CONTENT_TYPE].to_str()?.starts_with("text/csv"));
    assert_eq!(resp.text(), "currency,credits,total\r\nEUR,2,15.0\r\n");

    // stored filters win over the request
    let resp = app.send(Method::GET, &format!("{url}?currency=USD"), None, None).await?;
    assert_eq!(resp.text(), "currency,credits,total\r\nEUR,2,15.0\r\n");

    app.clock.advance(1);
    let resp = app.send(Method::GET, &url, None, None).await?;
    assert_eq!(resp.status, StatusCode::OK);

    app.clock.advance(1);
    let resp = app.send(Method::GET, &url, None, None).await?;
    assert_eq!(resp.status, StatusCode::GONE);
    assert_eq!(resp.code(), Some(626));

    let via_link: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM report_logs WHERE from_csv_hash = 1 AND user_id IS NULL AND format = 'csv'",
    )
    .fetch_one(&app.pool)
    .await?;
    assert_eq!(via_link, 3);

    Ok(())
}

#[tokio::test]
async fn unknown_and_malformed_link_hashes() -> Result<()> {
    let app = spawn_app().await?;

    let resp = app
        .send(Method::GET, "/api/v1.0/report/csv-view/deadbeef00", None, None)
        .await?;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.code(), Some(625));

    let resp = app
        .send(Method::GET, "/api/v1.0/report/csv-view/NOT-A-HASH", None, None)
        .await?;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.code(), Some(600));

    Ok(())
}

#[tokio::test]
async fn csv_link_rejects_bad_filters_and_missing_grants() -> Result<()> {
    let app = spawn_app().await?;
    let token = analyst(&app).await?;

    let resp = app
        .send(Method::POST, &format!("{CREDITS_SUMMARY}/csv-link?active=maybe"), Some(&token), None)
        .await?;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app
        .send(Method::POST, "/api/v1.0/admin/report/finance/nope/csv-link", Some(&token), None)
        .await?;
    assert_eq!(resp.code(), Some(627));

    let outsider = app.token(app.create_user("outsider@example.com").await?);
    let resp = app
        .send(Method::POST, &format!("{CREDITS_SUMMARY}/csv-link"), Some(&outsider), None)
        .await?;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    assert_eq!(app.count("report_csv_views").await?, 0);

    Ok(())
}
