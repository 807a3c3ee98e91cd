use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::ReportDefinition;
use crate::db::row_parsers::decode_row;
use crate::errors::AppResult;
use crate::services::export::entities_to_csv;
use crate::services::query::ExportFormat;
use crate::services::Entity;
use crate::utils::format_timestamp;

#[derive(Debug, Clone, Serialize)]
pub struct RenderedReport {
    pub group: &'static str,
    pub alias: &'static str,
    pub title: &'static str,
    pub columns: Vec<&'static str>,
    pub rows: Vec<Entity>,
}

impl RenderedReport {
    pub fn to_csv(&self) -> Vec<u8> {
        entities_to_csv(&self.columns, &self.rows)
    }
}

/// Runs a definition with the given query parameters. Parameters the
/// definition does not declare are ignored.
pub async fn run_report(
    pool: &SqlitePool,
    definition: &ReportDefinition,
    params: &HashMap<String, String>,
) -> AppResult<RenderedReport> {
    let mut qb = QueryBuilder::<Sqlite>::new(definition.select);
    qb.push(" WHERE 1 = 1");
    for filter in &definition.filters {
        if let Some(value) = filter.value(params)? {
            qb.push(format!(" AND {} {} ", filter.expr, filter.op));
            value.bind_to(&mut qb);
        }
    }
    qb.push(definition.tail);

    let rows = qb.build().fetch_all(pool).await?;
    let rows = rows
        .iter()
        .map(|row| decode_row(row, definition.columns.iter().copied()))
        .collect::<AppResult<Vec<_>>>()?;

    Ok(RenderedReport {
        group: definition.group,
        alias: definition.alias,
        title: definition.title,
        columns: definition.columns.iter().map(|(name, _)| *name).collect(),
        rows,
    })
}

/// Records one render. Failures are logged and swallowed; a report that
/// rendered is still returned to the caller.
pub async fn log_render(
    pool: &SqlitePool,
    definition: &ReportDefinition,
    user_id: Option<i64>,
    format: ExportFormat,
    from_csv_hash: bool,
    at: DateTime<Utc>,
) {
    let result = sqlx::query(
        "INSERT INTO report_logs (group_name, alias, user_id, format, from_csv_hash, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(definition.group)
    .bind(definition.alias)
    .bind(user_id)
    .bind(format.as_str())
    .bind(from_csv_hash)
    .bind(format_timestamp(at))
    .execute(pool)
    .await;

    if let Err(err) = result {
        tracing::warn!(report = %definition.key(), error = %err, "failed to write report log");
    }
}
