use axum::extract::State;
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::authz::Principal;
use crate::db::row_parsers;
use crate::dispatch::JsonBody;
use crate::envelope::{Envelope, EnvelopeBody};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::user::{AuthResponse, DbUser, LoginRequest, MeResponse, User};
use crate::utils::verify_password;

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at, updated_at, deleted_at";

fn to_data<T: serde::Serialize>(value: T) -> AppResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| AppError::internal(format!("response encode: {e}")))
}

#[utoipa::path(
    post,
    path = "/api/v1.0/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful; data is an AuthResponse", body = EnvelopeBody),
        (status = 401, description = "Invalid credentials (code 610)")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> AppResult<Envelope> {
    let db_user = fetch_user_by_email(&state.pool, payload.email.trim())
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &db_user.password_hash)? {
        tracing::info!(user_id = db_user.id, "login rejected");
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let token = state.jwt.encode(db_user.id)?;
    tracing::info!(user_id = db_user.id, "login");

    Ok(Envelope::ok(to_data(AuthResponse {
        token,
        user: db_user.into(),
    })?))
}

#[utoipa::path(
    get,
    path = "/api/v1.0/auth/me",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current user with roles and grants; data is a MeResponse", body = EnvelopeBody),
        (status = 401, description = "Missing or invalid token (code 610)")
    )
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Envelope> {
    let user: User = fetch_user_by_id(&state.pool, auth.user_id).await?.into();
    let principal = Principal::load(&state.pool, auth.user_id).await?;

    Ok(Envelope::ok(to_data(MeResponse {
        user,
        access: principal.effective(),
    })?))
}

async fn fetch_user_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ? AND deleted_at IS NULL");
    let row = sqlx::query(&sql).bind(email).fetch_optional(pool).await?;

    row.as_ref().map(row_parsers::db_user_from_row).transpose()
}

async fn fetch_user_by_id(pool: &SqlitePool, user_id: i64) -> AppResult<DbUser> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? AND deleted_at IS NULL");
    let row = sqlx::query(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        // a valid token for a removed user is an authentication failure
        .ok_or_else(|| AppError::unauthorized("user no longer exists"))?;

    row_parsers::db_user_from_row(&row)
}
