//! Generic action handlers shared by every registered resource.
//!
//! The resource is injected as an `Extension<Arc<ResourceDescriptor>>` by the
//! router; the grant has already been enforced by the time these run.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Extension;
use serde_json::{json, Value};

use super::extract::{JsonBody, NumericId};
use super::registry::ResourceDescriptor;
use crate::app::AppState;
use crate::authz::Principal;
use crate::envelope::{ActionResponse, Envelope, FileResponse};
use crate::errors::{AppError, AppResult};
use crate::services::export::{csv_filename, entities_to_csv};
use crate::services::query::{ExportFormat, ListQuery, DEFAULT_GRID_LIMIT};
use crate::services::schema::View;
use crate::services::FieldMap;

type Resource = Extension<Arc<ResourceDescriptor>>;

fn project_all(resource: &ResourceDescriptor, items: &[crate::services::Entity], view: View) -> Value {
    Value::Array(
        items
            .iter()
            .map(|entity| Value::Object(resource.project(entity, view)))
            .collect(),
    )
}

/// Renders every row matching `query` (pagination ignored) as CSV.
async fn export_csv(state: &AppState, resource: &ResourceDescriptor, query: &ListQuery, view: View) -> AppResult<ActionResponse> {
    let rows = resource.service.list(&state.pool, &query.without_pagination()).await?;
    let columns: Vec<&str> = resource.schema().view_columns(view).map(|c| c.name).collect();

    tracing::info!(resource = resource.name, rows = rows.len(), "csv export");
    let filename = csv_filename(&format!("{}-{}", resource.name, view.suffix()));
    Ok(FileResponse::csv(entities_to_csv(&columns, &rows), filename).into())
}

pub async fn grid(
    State(state): State<AppState>,
    Extension(resource): Resource,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<ActionResponse> {
    let query = ListQuery::parse(
        &params,
        resource.schema(),
        Some(DEFAULT_GRID_LIMIT),
        state.settings.grid_max_limit,
    )?;
    if query.format == ExportFormat::Csv {
        return export_csv(&state, &resource, &query, View::Grid).await;
    }

    let page = resource.service.grid(&state.pool, &query).await?;
    let data = json!({
        "items": project_all(&resource, &page.items, View::Grid),
        "total": page.total,
        "page": page.page,
        "limit": page.limit,
        "pages": page.pages,
    });

    Ok(Envelope::ok(data).with_groups(vec![resource.group(View::Grid)]).into())
}

/// Column metadata for the requested serialization group (`grid` by default).
pub async fn grid_options(
    Extension(resource): Resource,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<ActionResponse> {
    let view = match params.get("group") {
        Some(raw) => View::parse(raw).ok_or_else(|| AppError::validation(format!("unknown group '{raw}'")))?,
        None => View::Grid,
    };

    Ok(Envelope::ok(resource.column_options(view)).into())
}

pub async fn list(
    State(state): State<AppState>,
    Extension(resource): Resource,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<ActionResponse> {
    let query = ListQuery::parse(&params, resource.schema(), None, state.settings.grid_max_limit)?;
    if query.format == ExportFormat::Csv {
        return export_csv(&state, &resource, &query, View::List).await;
    }

    let items = resource.service.list(&state.pool, &query).await?;
    Ok(Envelope::ok(project_all(&resource, &items, View::List))
        .with_groups(vec![resource.group(View::List)])
        .into())
}

pub async fn get_one(
    State(state): State<AppState>,
    Extension(resource): Resource,
    NumericId(id): NumericId,
) -> AppResult<ActionResponse> {
    let entity = resource.service.get_by_id(&state.pool, id).await?;
    Ok(Envelope::ok(Value::Object(resource.project(&entity, View::Get)))
        .with_groups(vec![resource.group(View::Get)])
        .into())
}

pub async fn add(
    State(state): State<AppState>,
    Extension(resource): Resource,
    Extension(principal): Extension<Principal>,
    JsonBody(fields): JsonBody<FieldMap>,
) -> AppResult<ActionResponse> {
    let mut tx = state.pool.begin().await?;
    let id = resource.service.add(&mut *tx, fields).await?;
    tx.commit().await?;

    tracing::info!(resource = resource.name, id, user_id = principal.user_id, "resource added");
    Ok(Envelope::created(json!([id])).into())
}

pub async fn edit(
    State(state): State<AppState>,
    Extension(resource): Resource,
    Extension(principal): Extension<Principal>,
    NumericId(id): NumericId,
    JsonBody(fields): JsonBody<FieldMap>,
) -> AppResult<ActionResponse> {
    let mut tx = state.pool.begin().await?;
    resource.service.edit(&mut *tx, id, fields).await?;
    tx.commit().await?;

    tracing::info!(resource = resource.name, id, user_id = principal.user_id, "resource edited");
    Ok(Envelope::accepted_empty().into())
}

pub async fn delete_one(
    State(state): State<AppState>,
    Extension(resource): Resource,
    Extension(principal): Extension<Principal>,
    NumericId(id): NumericId,
) -> AppResult<ActionResponse> {
    let mut tx = state.pool.begin().await?;
    resource.service.remove(&mut *tx, id).await?;
    tx.commit().await?;

    tracing::info!(resource = resource.name, id, user_id = principal.user_id, "resource deleted");
    Ok(Envelope::no_content().into())
}

pub async fn delete_bulk(
    State(state): State<AppState>,
    Extension(resource): Resource,
    Extension(principal): Extension<Principal>,
    JsonBody(ids): JsonBody<Vec<Value>>,
) -> AppResult<ActionResponse> {
    let mut tx = state.pool.begin().await?;
    let removed = resource.service.remove_bulk(&mut *tx, &ids).await?;
    tx.commit().await?;

    tracing::info!(resource = resource.name, removed, user_id = principal.user_id, "resources deleted");
    Ok(Envelope::no_content().into())
}

pub async fn related_info(
    State(state): State<AppState>,
    Extension(resource): Resource,
    JsonBody(ids): JsonBody<Vec<Value>>,
) -> AppResult<ActionResponse> {
    let info = resource.service.get_related_info(&state.pool, &ids).await?;
    let data = serde_json::to_value(info).map_err(|e| AppError::internal(format!("related info: {e}")))?;

    Ok(Envelope::ok(data).into())
}
