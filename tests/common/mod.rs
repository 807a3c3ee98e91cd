#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::body::{self, Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`

use admin_api::authz::GrantLevel;
use admin_api::config::Settings;
use admin_api::jwt::JwtConfig;
use admin_api::utils::{format_timestamp, hash_password, Clock};
use admin_api::{build_router, AppState};

pub const PASSWORD: &str = "password123";

/// Clock the tests can move.
pub struct TestClock(Mutex<DateTime<Utc>>);

impl TestClock {
    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock().unwrap() = at;
    }

    pub fn advance(&self, secs: i64) {
        let mut now = self.0.lock().unwrap();
        *now += Duration::seconds(secs);
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

pub struct TestApp {
    // dropped last: removes the database file
    _dir: TempDir,
    pub pool: SqlitePool,
    pub router: Router,
    pub jwt: JwtConfig,
    pub clock: Arc<TestClock>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).unwrap_or(Value::Null)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Error envelope code, if any.
    pub fn code(&self) -> Option<u64> {
        self.json().get("code").and_then(Value::as_u64)
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub async fn spawn_app() -> Result<TestApp> {
    let dir = tempdir().context("failed to create tempdir")?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator =
        sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    let jwt = JwtConfig::new(b"test-secret".to_vec(), 1);
    let clock = Arc::new(TestClock(Mutex::new(start_time())));
    let state = AppState::with_clock(pool.clone(), jwt.clone(), Settings::default(), clock.clone())?;

    Ok(TestApp {
        _dir: dir,
        pool,
        router: build_router(state),
        jwt,
        clock,
    })
}

impl TestApp {
    pub async fn create_user(&self, email: &str) -> Result<i64> {
        let now = format_timestamp(Utc::now());
        let id = sqlx::query(
            "INSERT INTO users (name, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(email)
        .bind(email)
        .bind(hash_password(PASSWORD)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn create_super_admin(&self, email: &str) -> Result<i64> {
        let id = self.create_user(email).await?;
        sqlx::query("INSERT INTO user_roles (user_id, role_id) SELECT ?, id FROM roles WHERE name = 'super_admin'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn grant(&self, user_id: i64, grant_key: &str, level: GrantLevel) -> Result<()> {
        sqlx::query("INSERT INTO user_grants (user_id, grant_key, level) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(grant_key)
            .bind(level.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn grant_role(&self, user_id: i64, role: &str, grant_key: &str, level: GrantLevel) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO roles (name) VALUES (?)")
            .bind(role)
            .execute(&self.pool)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO role_grants (role_id, grant_key, level) SELECT id, ?, ? FROM roles WHERE name = ?")
            .bind(grant_key)
            .bind(level.as_str())
            .bind(role)
            .execute(&self.pool)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) SELECT ?, id FROM roles WHERE name = ?")
            .bind(user_id)
            .bind(role)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub fn token(&self, user_id: i64) -> String {
        self.jwt.encode(user_id).unwrap()
    }

    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<TestResponse> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = body::to_bytes(response.into_body(), 10_485_760).await?;

        Ok(TestResponse { status, headers, bytes })
    }

    pub async fn count(&self, table: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
