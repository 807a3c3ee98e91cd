use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite};

use super::schema::{ColumnKind, TableSpec};
use crate::errors::{AppError, AppResult};

pub const DEFAULT_GRID_LIMIT: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(params: &HashMap<String, String>) -> AppResult<Self> {
        match params.get("format").map(|f| f.trim().to_ascii_lowercase()) {
            None => Ok(ExportFormat::Json),
            Some(f) if f.is_empty() || f == "json" => Ok(ExportFormat::Json),
            Some(f) if f == "csv" => Ok(ExportFormat::Csv),
            Some(other) => Err(AppError::validation(format!("unsupported format '{other}'"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

/// A typed value ready to bind into a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn bind_to(self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            SqlValue::Null => qb.push_bind(Option::<String>::None),
            SqlValue::Integer(v) => qb.push_bind(v),
            SqlValue::Real(v) => qb.push_bind(v),
            SqlValue::Text(v) => qb.push_bind(v),
        };
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Equals,
    Contains,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: &'static str,
    pub op: FilterOp,
    pub value: SqlValue,
}

/// Parsed filter/sort/page parameters for List and Grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub page: i64,
    pub limit: Option<i64>,
    pub sort: &'static str,
    pub order: SortOrder,
    pub filters: Vec<Filter>,
    pub format: ExportFormat,
}

impl ListQuery {
    /// `default_limit` is applied when the request has no `limit`; lists pass
    /// `None` so they return every matching row.
    pub fn parse(
        params: &HashMap<String, String>,
        spec: &TableSpec,
        default_limit: Option<i64>,
        max_limit: i64,
    ) -> AppResult<Self> {
        let page = match params.get("page") {
            Some(raw) => parse_positive("page", raw)?,
            None => 1,
        };

        let limit = match params.get("limit") {
            Some(raw) => Some(parse_positive("limit", raw)?),
            None => default_limit,
        }
        .map(|limit| limit.min(max_limit));

        let sort = match params.get("sort") {
            Some(raw) => {
                let column = spec
                    .find(raw)
                    .filter(|column| column.sortable)
                    .ok_or_else(|| AppError::validation(format!("cannot sort by '{raw}'")))?;
                column.name
            }
            None => spec.default_sort,
        };

        let order = match params.get("order").map(|o| o.to_ascii_lowercase()) {
            None => SortOrder::Asc,
            Some(o) if o == "asc" => SortOrder::Asc,
            Some(o) if o == "desc" => SortOrder::Desc,
            Some(other) => return Err(AppError::validation(format!("invalid order '{other}'"))),
        };

        let mut filters = Vec::new();
        let mut keys: Vec<&String> = params.keys().collect();
        keys.sort();
        for key in keys {
            let Some(name) = key.strip_prefix("filter[").and_then(|rest| rest.strip_suffix(']')) else {
                continue;
            };
            let column = spec
                .find(name)
                .filter(|column| column.filterable)
                .ok_or_else(|| AppError::validation(format!("cannot filter by '{name}'")))?;
            let raw = &params[key];
            let (op, value) = match column.kind {
                ColumnKind::Text => (FilterOp::Contains, SqlValue::Text(raw.clone())),
                kind => (FilterOp::Equals, coerce_param(column.name, kind, raw)?),
            };
            filters.push(Filter {
                column: column.name,
                op,
                value,
            });
        }

        let query = Self {
            page,
            limit,
            sort,
            order,
            filters,
            format: ExportFormat::parse(params)?,
        };
        // a later limit never exceeds max_limit, so this bounds every offset
        query.offset(limit.unwrap_or(max_limit))?;

        Ok(query)
    }

    /// Row offset of the requested page for a page size of `limit`.
    pub fn offset(&self, limit: i64) -> AppResult<i64> {
        (self.page - 1)
            .checked_mul(limit)
            .ok_or_else(|| AppError::validation("'page' is out of range"))
    }

    /// Exports always cover every matching row.
    pub fn without_pagination(&self) -> Self {
        Self {
            page: 1,
            limit: None,
            ..self.clone()
        }
    }
}

fn parse_positive(name: &str, raw: &str) -> AppResult<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|value| *value >= 1)
        .ok_or_else(|| AppError::validation(format!("'{name}' must be a positive integer")))
}

/// Converts a query-string value into a typed value for `kind`.
pub fn coerce_param(name: &str, kind: ColumnKind, raw: &str) -> AppResult<SqlValue> {
    let raw = raw.trim();
    let invalid = || AppError::validation(format!("invalid value for '{name}': '{raw}'"));
    match kind {
        ColumnKind::Integer => raw.parse::<i64>().map(SqlValue::Integer).map_err(|_| invalid()),
        ColumnKind::Real => raw.parse::<f64>().map(SqlValue::Real).map_err(|_| invalid()),
        ColumnKind::Bool => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" => Ok(SqlValue::Integer(1)),
            "0" | "false" => Ok(SqlValue::Integer(0)),
            _ => Err(invalid()),
        },
        ColumnKind::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|date| SqlValue::Text(date.format("%Y-%m-%d").to_string()))
            .map_err(|_| invalid()),
        ColumnKind::Text | ColumnKind::Timestamp => Ok(SqlValue::Text(raw.to_string())),
    }
}

/// Converts a JSON body value into a typed value for `kind`.
pub fn coerce_json(name: &str, kind: ColumnKind, value: &Value) -> AppResult<SqlValue> {
    let invalid = || AppError::validation(format!("field '{name}' expects {}", expected(kind)));
    match (kind, value) {
        (_, Value::Null) => Ok(SqlValue::Null),
        (ColumnKind::Integer, Value::Number(n)) => n.as_i64().map(SqlValue::Integer).ok_or_else(invalid),
        (ColumnKind::Real, Value::Number(n)) => n.as_f64().map(SqlValue::Real).ok_or_else(invalid),
        (ColumnKind::Bool, Value::Bool(b)) => Ok(SqlValue::Integer(i64::from(*b))),
        (ColumnKind::Text, Value::String(s)) => Ok(SqlValue::Text(s.clone())),
        (ColumnKind::Date, Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(|date| SqlValue::Text(date.format("%Y-%m-%d").to_string()))
            .map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn expected(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Integer => "an integer",
        ColumnKind::Real => "a number",
        ColumnKind::Text => "a string",
        ColumnKind::Bool => "a boolean",
        ColumnKind::Date => "a date (YYYY-MM-DD)",
        ColumnKind::Timestamp => "a timestamp",
    }
}

/// Parses a raw id list (strings or numbers). Duplicates are dropped, order kept.
pub fn parse_id_list(raw: &[Value]) -> AppResult<Vec<i64>> {
    if raw.is_empty() {
        return Err(AppError::validation("id list is empty"));
    }

    let mut ids = Vec::with_capacity(raw.len());
    for value in raw {
        let id = match value {
            Value::Number(n) => n.as_i64().filter(|id| *id >= 0),
            Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| AppError::validation(format!("invalid id {value}")))?;

        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::schema::ColumnSpec;
    use serde_json::json;

    fn spec() -> TableSpec {
        TableSpec::new("credits")
            .column(ColumnSpec::new("name", ColumnKind::Text))
            .column(ColumnSpec::new("amount", ColumnKind::Real))
            .column(ColumnSpec::new("active", ColumnKind::Bool))
            .column(ColumnSpec::new("note", ColumnKind::Text).unsortable().unfilterable())
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_for_grid() {
        let query = ListQuery::parse(&params(&[]), &spec(), Some(DEFAULT_GRID_LIMIT), 500).unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, Some(20));
        assert_eq!(query.sort, "id");
        assert_eq!(query.order, SortOrder::Asc);
        assert_eq!(query.format, ExportFormat::Json);
        assert_eq!(query.offset(DEFAULT_GRID_LIMIT).unwrap(), 0);
    }

    #[test]
    fn limit_is_capped_and_offset_follows_page() {
        let query = ListQuery::parse(&params(&[("page", "3"), ("limit", "1000")]), &spec(), None, 50).unwrap();
        assert_eq!(query.limit, Some(50));
        assert_eq!(query.offset(query.limit.unwrap()).unwrap(), 100);
        assert_eq!(query.without_pagination().limit, None);
    }

    #[test]
    fn page_beyond_any_offset_is_rejected() {
        let huge = i64::MAX.to_string();
        let err = ListQuery::parse(&params(&[("page", huge.as_str())]), &spec(), Some(DEFAULT_GRID_LIMIT), 500).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // lists without a limit are bounded by the cap as well
        assert!(ListQuery::parse(&params(&[("page", huge.as_str())]), &spec(), None, 500).is_err());

        let last = (i64::MAX / 500 + 1).to_string();
        let query = ListQuery::parse(&params(&[("page", last.as_str()), ("limit", "500")]), &spec(), None, 500).unwrap();
        assert!(query.offset(500).is_ok());
    }

    #[test]
    fn filters_are_typed_by_column_kind() {
        let query = ListQuery::parse(
            &params(&[("filter[name]", "bank"), ("filter[active]", "true"), ("filter[amount]", "12.5")]),
            &spec(),
            None,
            500,
        )
        .unwrap();

        assert_eq!(
            query.filters,
            vec![
                Filter { column: "active", op: FilterOp::Equals, value: SqlValue::Integer(1) },
                Filter { column: "amount", op: FilterOp::Equals, value: SqlValue::Real(12.5) },
                Filter { column: "name", op: FilterOp::Contains, value: SqlValue::Text("bank".into()) },
            ]
        );
    }

    #[test]
    fn rejects_unknown_sort_and_filter_columns() {
        assert!(ListQuery::parse(&params(&[("sort", "note")]), &spec(), None, 500).is_err());
        assert!(ListQuery::parse(&params(&[("sort", "password")]), &spec(), None, 500).is_err());
        assert!(ListQuery::parse(&params(&[("filter[note]", "x")]), &spec(), None, 500).is_err());
        assert!(ListQuery::parse(&params(&[("filter[amount]", "lots")]), &spec(), None, 500).is_err());
        assert!(ListQuery::parse(&params(&[("page", "0")]), &spec(), None, 500).is_err());
        assert!(ListQuery::parse(&params(&[("format", "pdf")]), &spec(), None, 500).is_err());
    }

    #[test]
    fn id_list_accepts_strings_and_numbers() {
        assert_eq!(parse_id_list(&[json!("2"), json!(1), json!("5"), json!(2)]).unwrap(), vec![2, 1, 5]);
        assert!(parse_id_list(&[json!("2a")]).is_err());
        assert!(parse_id_list(&[json!(-1)]).is_err());
        assert!(parse_id_list(&[json!(null)]).is_err());
        assert!(parse_id_list(&[]).is_err());
    }

    #[test]
    fn json_coercion_checks_types() {
        assert_eq!(coerce_json("amount", ColumnKind::Real, &json!(3)).unwrap(), SqlValue::Real(3.0));
        assert_eq!(coerce_json("active", ColumnKind::Bool, &json!(false)).unwrap(), SqlValue::Integer(0));
        assert!(coerce_json("name", ColumnKind::Text, &json!(5)).is_err());
        assert!(coerce_json("issued_on", ColumnKind::Date, &json!("2025-02-30")).is_err());
        assert_eq!(coerce_json("note", ColumnKind::Text, &Value::Null).unwrap(), SqlValue::Null);
    }
}
