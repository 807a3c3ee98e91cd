use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::errors::AppError;
use crate::models::user::DbUser;
use crate::services::schema::ColumnKind;

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // Try RFC3339 first (e.g. 2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite default timestamp format: "YYYY-MM-DD HH:MM:SS" (with optional fractional seconds)
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range".to_string()))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

fn parse_opt_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    match s {
        Some(s) if !s.trim().is_empty() => Ok(Some(parse_datetime(&s)?)),
        _ => Ok(None),
    }
}

/// Decodes one column of a dynamically-built row into JSON.
///
/// Uses unchecked decoding: SQLite values are dynamically typed, and
/// aggregates like `SUM` or `COALESCE` carry no declared column type.
pub fn decode_cell(row: &SqliteRow, name: &str, kind: ColumnKind) -> Result<Value, AppError> {
    let missing = |e: sqlx::Error| AppError::internal(format!("column {name}: {e}"));

    let value = match kind {
        ColumnKind::Integer => row
            .try_get_unchecked::<Option<i64>, _>(name)
            .map_err(missing)?
            .map(Value::from)
            .unwrap_or(Value::Null),
        ColumnKind::Real => row
            .try_get_unchecked::<Option<f64>, _>(name)
            .map_err(missing)?
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ColumnKind::Bool => row
            .try_get_unchecked::<Option<i64>, _>(name)
            .map_err(missing)?
            .map(|v| Value::Bool(v != 0))
            .unwrap_or(Value::Null),
        ColumnKind::Text | ColumnKind::Date => row
            .try_get_unchecked::<Option<String>, _>(name)
            .map_err(missing)?
            .map(Value::String)
            .unwrap_or(Value::Null),
        ColumnKind::Timestamp => {
            let raw = row.try_get_unchecked::<Option<String>, _>(name).map_err(missing)?;
            match parse_opt_datetime(raw)? {
                Some(at) => Value::String(crate::utils::format_timestamp(at)),
                None => Value::Null,
            }
        }
    };

    Ok(value)
}

pub fn decode_row<'a>(
    row: &SqliteRow,
    columns: impl IntoIterator<Item = (&'a str, ColumnKind)>,
) -> Result<Map<String, Value>, AppError> {
    let mut entity = Map::new();
    for (name, kind) in columns {
        entity.insert(name.to_string(), decode_cell(row, name, kind)?);
    }
    Ok(entity)
}

pub fn db_user_from_row(row: &SqliteRow) -> Result<DbUser, AppError> {
    let get_text = |col: &str| -> Result<String, AppError> {
        row.try_get::<String, _>(col)
            .map_err(|e| AppError::internal(format!("missing {col}: {e}")))
    };

    let id: i64 = row
        .try_get("id")
        .map_err(|e| AppError::internal(format!("missing id: {e}")))?;
    let deleted_at: Option<String> = row
        .try_get("deleted_at")
        .map_err(|e| AppError::internal(format!("missing deleted_at: {e}")))?;

    Ok(DbUser {
        id,
        name: get_text("name")?,
        email: get_text("email")?,
        password_hash: get_text("password_hash")?,
        created_at: parse_datetime(&get_text("created_at")?)?,
        updated_at: parse_datetime(&get_text("updated_at")?)?,
        deleted_at: parse_opt_datetime(deleted_at)?,
    })
}
