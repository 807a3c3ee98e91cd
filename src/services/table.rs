use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use super::query::{coerce_json, parse_id_list, FilterOp, ListQuery, SqlValue, DEFAULT_GRID_LIMIT};
use super::schema::TableSpec;
use super::{Entity, FieldMap, GridPage, ReferenceUsage, RelatedInfo, ResourceService};
use crate::db::row_parsers::decode_row;
use crate::errors::{AppError, AppResult};
use crate::utils::{format_timestamp, Clock};

/// Generic SQL-backed service driven entirely by a [`TableSpec`].
pub struct TableService {
    resource: &'static str,
    spec: TableSpec,
    clock: Arc<dyn Clock>,
}

impl TableService {
    pub fn new(resource: &'static str, spec: TableSpec, clock: Arc<dyn Clock>) -> Self {
        Self { resource, spec, clock }
    }

    fn decode(&self, row: &SqliteRow) -> AppResult<Entity> {
        decode_row(row, self.spec.columns.iter().map(|c| (c.name, c.kind)))
    }

    fn not_found(&self, id: i64) -> AppError {
        AppError::not_found(format!("{} {}", self.resource, id))
    }

    /// Validates a submitted field map against the column specs and returns
    /// the values to write, in column order.
    fn writable_values(&self, fields: &FieldMap, creating: bool) -> AppResult<Vec<(&'static str, SqlValue)>> {
        for key in fields.keys() {
            let column = self
                .spec
                .find(key)
                .ok_or_else(|| AppError::validation(format!("unknown field '{key}'")))?;
            if !column.writable {
                return Err(AppError::validation(format!("field '{key}' is read-only")));
            }
        }

        let mut values = Vec::new();
        for column in self.spec.columns.iter().filter(|c| c.writable) {
            match fields.get(column.name) {
                Some(raw) => {
                    let value = coerce_json(column.name, column.kind, raw)?;
                    if column.required && value == SqlValue::Null {
                        return Err(AppError::validation(format!("field '{}' is required", column.name)));
                    }
                    values.push((column.name, value));
                }
                None if creating && column.required => {
                    return Err(AppError::validation(format!("field '{}' is required", column.name)));
                }
                None => {}
            }
        }

        Ok(values)
    }

    async fn select_page(&self, pool: &SqlitePool, query: &ListQuery, limit: Option<i64>) -> AppResult<Vec<Entity>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM {}", self.spec.select_list(), self.spec.table));
        push_filters(&mut qb, query);
        let order = query.order.as_sql();
        qb.push(format!(" ORDER BY {} {order}, id {order}", query.sort));
        if let Some(limit) = limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
            qb.push(" OFFSET ");
            qb.push_bind(query.offset(limit)?);
        }

        let rows = qb.build().fetch_all(pool).await?;
        rows.iter().map(|row| self.decode(row)).collect()
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &ListQuery) {
    qb.push(" WHERE 1 = 1");
    for filter in &query.filters {
        qb.push(" AND ");
        qb.push(filter.column);
        match (&filter.op, &filter.value) {
            (FilterOp::Contains, SqlValue::Text(text)) => {
                qb.push(" LIKE ");
                qb.push_bind(format!("%{}%", escape_like(text)));
                qb.push(" ESCAPE '\\'");
            }
            (_, value) => {
                qb.push(" = ");
                value.clone().bind_to(qb);
            }
        }
    }
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    qb.push(" IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

#[async_trait]
impl ResourceService for TableService {
    fn schema(&self) -> &TableSpec {
        &self.spec
    }

    async fn get_by_id(&self, pool: &SqlitePool, id: i64) -> AppResult<Entity> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?", self.spec.select_list(), self.spec.table);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| self.not_found(id))?;

        self.decode(&row)
    }

    async fn list(&self, pool: &SqlitePool, query: &ListQuery) -> AppResult<Vec<Entity>> {
        self.select_page(pool, query, query.limit).await
    }

    async fn grid(&self, pool: &SqlitePool, query: &ListQuery) -> AppResult<GridPage> {
        let mut count = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", self.spec.table));
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let limit = query.limit.unwrap_or(DEFAULT_GRID_LIMIT);
        let items = self.select_page(pool, query, Some(limit)).await?;

        Ok(GridPage::new(items, total, query.page, limit))
    }

    async fn add(&self, conn: &mut SqliteConnection, fields: FieldMap) -> AppResult<i64> {
        let mut values = self.writable_values(&fields, true)?;
        if self.spec.timestamps {
            let now = format_timestamp(self.clock.now());
            values.push(("created_at", SqlValue::Text(now.clone())));
            values.push(("updated_at", SqlValue::Text(now)));
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!("INSERT INTO {}", self.spec.table));
        if values.is_empty() {
            qb.push(" DEFAULT VALUES");
        } else {
            let names: Vec<&str> = values.iter().map(|(name, _)| *name).collect();
            qb.push(format!(" ({}) VALUES (", names.join(", ")));
            for (index, (_, value)) in values.into_iter().enumerate() {
                if index > 0 {
                    qb.push(", ");
                }
                value.bind_to(&mut qb);
            }
            qb.push(")");
        }

        let result = qb.build().execute(&mut *conn).await?;
        let id = result.last_insert_rowid();
        tracing::debug!(resource = self.resource, id, "row inserted");
        Ok(id)
    }

    async fn edit(&self, conn: &mut SqliteConnection, id: i64, fields: FieldMap) -> AppResult<()> {
        let mut values = self.writable_values(&fields, false)?;
        if values.is_empty() {
            return Err(AppError::validation("no fields to update"));
        }
        if self.spec.timestamps {
            values.push(("updated_at", SqlValue::Text(format_timestamp(self.clock.now()))));
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET ", self.spec.table));
        for (index, (name, value)) in values.into_iter().enumerate() {
            if index > 0 {
                qb.push(", ");
            }
            qb.push(format!("{name} = "));
            value.bind_to(&mut qb);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);

        let affected = qb.build().execute(&mut *conn).await?;
        if affected.rows_affected() == 0 {
            return Err(self.not_found(id));
        }
        Ok(())
    }

    async fn remove(&self, conn: &mut SqliteConnection, id: i64) -> AppResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.spec.table);
        let affected = sqlx::query(&sql).bind(id).execute(&mut *conn).await?;

        if affected.rows_affected() == 0 {
            return Err(self.not_found(id));
        }
        Ok(())
    }

    async fn remove_bulk(&self, conn: &mut SqliteConnection, ids: &[Value]) -> AppResult<u64> {
        let ids = parse_id_list(ids)?;
        for id in &ids {
            self.remove(&mut *conn, *id).await?;
        }
        Ok(ids.len() as u64)
    }

    async fn get_related_info(&self, pool: &SqlitePool, ids: &[Value]) -> AppResult<RelatedInfo> {
        let ids = parse_id_list(ids)?;

        let mut existing_query = QueryBuilder::<Sqlite>::new(format!("SELECT id FROM {} WHERE id", self.spec.table));
        push_id_list(&mut existing_query, &ids);
        let existing: Vec<i64> = existing_query.build_query_scalar().fetch_all(pool).await?;
        let missing: Vec<i64> = ids.iter().copied().filter(|id| !existing.contains(id)).collect();

        let mut references = Vec::with_capacity(self.spec.references.len());
        for reference in &self.spec.references {
            let mut qb = QueryBuilder::<Sqlite>::new(format!(
                "SELECT {col} AS ref_id, COUNT(*) AS uses FROM {table} WHERE {col}",
                col = reference.column,
                table = reference.table
            ));
            push_id_list(&mut qb, &ids);
            qb.push(format!(" GROUP BY {}", reference.column));

            let rows = qb.build().fetch_all(pool).await?;
            let mut by_id = Map::new();
            let mut count = 0;
            for row in rows {
                let ref_id: i64 = row.try_get("ref_id")?;
                let uses: i64 = row.try_get("uses")?;
                count += uses;
                by_id.insert(ref_id.to_string(), Value::from(uses));
            }

            references.push(ReferenceUsage {
                resource: reference.resource.to_string(),
                field: reference.column.to_string(),
                count,
                by_id,
            });
        }

        let total = references.iter().map(|r| r.count).sum();
        Ok(RelatedInfo {
            ids,
            missing,
            in_use: total > 0,
            total,
            references,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::schema::{ColumnKind, ColumnSpec};
    use crate::utils::FixedClock;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> (SqlitePool, TableService) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query(
            "CREATE TABLE categories (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, budget REAL, created_at TEXT NOT NULL, updated_at TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, category_id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();

        let spec = TableSpec::new("categories")
            .column(ColumnSpec::new("name", ColumnKind::Text).required())
            .column(ColumnSpec::new("budget", ColumnKind::Real))
            .with_timestamps()
            .referenced_by("item", "items", "category_id");

        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap()));
        (pool, TableService::new("category", spec, clock))
    }

    fn fields(value: Value) -> FieldMap {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let (pool, service) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        let id = service
            .add(&mut conn, fields(json!({"name": "Travel", "budget": 250.5})))
            .await
            .unwrap();
        drop(conn);

        let entity = service.get_by_id(&pool, id).await.unwrap();
        assert_eq!(entity["name"], json!("Travel"));
        assert_eq!(entity["budget"], json!(250.5));
        assert_eq!(entity["created_at"], json!("2025-05-01T08:00:00Z"));
    }

    #[tokio::test]
    async fn add_validates_fields() {
        let (pool, service) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        let missing = service.add(&mut conn, fields(json!({"budget": 1.0}))).await;
        assert!(matches!(missing, Err(AppError::Validation(_))));

        let unknown = service.add(&mut conn, fields(json!({"name": "x", "owner": 1}))).await;
        assert!(matches!(unknown, Err(AppError::Validation(_))));

        let read_only = service.add(&mut conn, fields(json!({"name": "x", "id": 9}))).await;
        assert!(matches!(read_only, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn bulk_remove_is_all_or_nothing_inside_transaction() {
        let (pool, service) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let a = service.add(&mut conn, fields(json!({"name": "A"}))).await.unwrap();
        let b = service.add(&mut conn, fields(json!({"name": "B"}))).await.unwrap();
        drop(conn);

        let mut tx = pool.begin().await.unwrap();
        let result = service
            .remove_bulk(&mut *tx, &[json!(a.to_string()), json!(999), json!(b)])
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        drop(tx);

        assert!(service.get_by_id(&pool, a).await.is_ok());
        assert!(service.get_by_id(&pool, b).await.is_ok());
    }

    #[tokio::test]
    async fn related_info_counts_references() {
        let (pool, service) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let a = service.add(&mut conn, fields(json!({"name": "A"}))).await.unwrap();
        let b = service.add(&mut conn, fields(json!({"name": "B"}))).await.unwrap();
        for _ in 0..2 {
            sqlx::query("INSERT INTO items (category_id) VALUES (?)")
                .bind(a)
                .execute(&mut *conn)
                .await
                .unwrap();
        }
        drop(conn);

        let info = service
            .get_related_info(&pool, &[json!(a.to_string()), json!(b.to_string()), json!("77")])
            .await
            .unwrap();

        assert!(info.in_use);
        assert_eq!(info.total, 2);
        assert_eq!(info.missing, vec![77]);
        assert_eq!(info.references[0].by_id.get(&a.to_string()), Some(&json!(2)));
        assert!(info.references[0].by_id.get(&b.to_string()).is_none());
    }

    #[tokio::test]
    async fn grid_paginates_with_total() {
        let (pool, service) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        for name in ["alpha", "beta", "gamma", "delta", "alphabet"] {
            service.add(&mut conn, fields(json!({"name": name}))).await.unwrap();
        }
        drop(conn);

        let params = [("limit", "2"), ("page", "2"), ("sort", "name")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let query = ListQuery::parse(&params, service.schema(), Some(20), 100).unwrap();
        let page = service.grid(&pool, &query).await.unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.pages, 3);
        let names: Vec<_> = page.items.iter().map(|e| e["name"].clone()).collect();
        assert_eq!(names, vec![json!("beta"), json!("delta")]);

        let params = [("filter[name]", "alpha")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let query = ListQuery::parse(&params, service.schema(), None, 100).unwrap();
        assert_eq!(service.list(&pool, &query).await.unwrap().len(), 2);
    }
}
