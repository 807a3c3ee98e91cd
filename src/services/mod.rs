//! Resource services: the data-access side of every admin resource.
//!
//! The dispatcher only talks to [`ResourceService`]. Read methods take the
//! pool; mutating methods take a connection that the dispatcher has already
//! placed inside a transaction, so the service never commits on its own.

pub mod export;
pub mod query;
pub mod schema;
mod table;

pub use table::TableService;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{SqliteConnection, SqlitePool};

use crate::errors::AppResult;
use query::ListQuery;
use schema::TableSpec;

pub type Entity = Map<String, Value>;
pub type FieldMap = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridPage {
    pub items: Vec<Entity>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

impl GridPage {
    pub fn new(items: Vec<Entity>, total: i64, page: i64, limit: i64) -> Self {
        let pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self {
            items,
            total,
            page,
            limit,
            pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceUsage {
    pub resource: String,
    pub field: String,
    pub count: i64,
    /// Reference count per requested id (only ids with at least one reference).
    pub by_id: Map<String, Value>,
}

/// Aggregated answer to "is any of these rows referenced elsewhere?".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedInfo {
    pub ids: Vec<i64>,
    pub missing: Vec<i64>,
    pub in_use: bool,
    pub total: i64,
    pub references: Vec<ReferenceUsage>,
}

#[async_trait]
pub trait ResourceService: Send + Sync {
    fn schema(&self) -> &TableSpec;

    async fn get_by_id(&self, pool: &SqlitePool, id: i64) -> AppResult<Entity>;

    async fn list(&self, pool: &SqlitePool, query: &ListQuery) -> AppResult<Vec<Entity>>;

    async fn grid(&self, pool: &SqlitePool, query: &ListQuery) -> AppResult<GridPage>;

    async fn add(&self, conn: &mut SqliteConnection, fields: FieldMap) -> AppResult<i64>;

    async fn edit(&self, conn: &mut SqliteConnection, id: i64, fields: FieldMap) -> AppResult<()>;

    async fn remove(&self, conn: &mut SqliteConnection, id: i64) -> AppResult<()>;

    /// All-or-nothing: any unknown or malformed id fails the whole call.
    async fn remove_bulk(&self, conn: &mut SqliteConnection, ids: &[Value]) -> AppResult<u64>;

    async fn get_related_info(&self, pool: &SqlitePool, ids: &[Value]) -> AppResult<RelatedInfo>;
}
