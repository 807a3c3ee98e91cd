use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Extension, Router};
use chrono::{TimeZone, Utc};

use super::csv_view::{self, is_valid_hash, link_path, IssuedLink};
use super::{log_render, run_report, ReportDefinition, ReportSummary};
use crate::app::AppState;
use crate::authz::{GrantLevel, Principal};
use crate::dispatch::router::guarded;
use crate::dispatch::{ResourceAction, RouteBinding, ADMIN_PREFIX};
use crate::envelope::{ActionResponse, Envelope, EnvelopeBody, FileResponse};
use crate::errors::{AppError, AppResult};
use crate::services::export::csv_filename;
use crate::services::query::ExportFormat;
use crate::utils::format_timestamp;

/// Grant key guarding the catalogue and link issuing.
pub const REPORT_GRANT: &str = "report";

/// Report routes in order: catalogue, render, link issue, public link view.
pub fn report_bindings() -> [RouteBinding; 4] {
    [
        RouteBinding::new(Method::GET, format!("{ADMIN_PREFIX}/report/list"), ResourceAction::Report)
            .requires(REPORT_GRANT, GrantLevel::View),
        RouteBinding::new(Method::GET, format!("{ADMIN_PREFIX}/report/:group/:alias"), ResourceAction::Report),
        RouteBinding::new(
            Method::POST,
            format!("{ADMIN_PREFIX}/report/:group/:alias/csv-link"),
            ResourceAction::Report,
        )
        .requires(REPORT_GRANT, GrantLevel::View),
        RouteBinding::new(Method::GET, "/api/v1.0/report/csv-view/:hash", ResourceAction::ReportCsvView).public(),
    ]
}

pub fn report_routes(state: &AppState) -> Router<AppState> {
    let [list, render, link, view] = report_bindings();
    let (list_path, render_path, issue_path, view_path) =
        (list.path.clone(), render.path.clone(), link.path.clone(), view.path);

    Router::new()
        .route(&list_path, guarded(state, list, get(report_list)))
        .route(&render_path, guarded(state, render, get(report)))
        .route(&issue_path, guarded(state, link, post(csv_link)))
        .route(&view_path, get(report_csv_view))
}

async fn ensure_definition_grant(state: &AppState, principal: &Principal, definition: &ReportDefinition) -> AppResult<()> {
    let Some(requirement) = &definition.grant else {
        return Ok(());
    };

    if state.evaluator.can(principal, requirement).await {
        return Ok(());
    }

    tracing::warn!(
        user_id = principal.user_id,
        report = %definition.key(),
        grant = %requirement,
        "report grant check failed"
    );
    Err(AppError::forbidden(format!("missing grant {requirement}")))
}

async fn render(
    state: &AppState,
    definition: &ReportDefinition,
    params: &HashMap<String, String>,
    format: ExportFormat,
    user_id: Option<i64>,
    from_csv_hash: bool,
) -> AppResult<ActionResponse> {
    let report = run_report(&state.pool, definition, params).await?;
    log_render(&state.pool, definition, user_id, format, from_csv_hash, state.clock.now()).await;

    tracing::info!(
        report = %definition.key(),
        rows = report.rows.len(),
        format = format.as_str(),
        from_csv_hash,
        "report rendered"
    );

    match format {
        ExportFormat::Csv => Ok(FileResponse::csv(report.to_csv(), csv_filename(&definition.key())).into()),
        ExportFormat::Json => {
            let data = serde_json::to_value(&report).map_err(|e| AppError::internal(format!("report encode: {e}")))?;
            Ok(Envelope::ok(data).into())
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1.0/admin/report/list",
    tag = "Reports",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Report catalogue", body = EnvelopeBody),
        (status = 403, description = "Missing grant report:VIEW")
    )
)]
pub async fn report_list(State(state): State<AppState>) -> AppResult<Envelope> {
    let summaries: Vec<ReportSummary> = state.reports.iter().map(ReportDefinition::summary).collect();
    let data = serde_json::to_value(summaries).map_err(|e| AppError::internal(format!("catalogue encode: {e}")))?;
    Ok(Envelope::ok(data))
}

#[utoipa::path(
    get,
    path = "/api/v1.0/admin/report/{group}/{alias}",
    tag = "Reports",
    security(("bearerAuth" = [])),
    params(
        ("group" = String, Path, description = "Report group"),
        ("alias" = String, Path, description = "Report alias"),
        ("format" = Option<String>, Query, description = "json (default) or csv")
    ),
    responses(
        (status = 200, description = "Rendered report (JSON preview or CSV file)", body = EnvelopeBody),
        (status = 403, description = "Missing the report's own grant"),
        (status = 404, description = "Unknown report (code 627)")
    )
)]
pub async fn report(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((group, alias)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<ActionResponse> {
    let definition = state.reports.find(&group, &alias)?;
    ensure_definition_grant(&state, &principal, definition).await?;

    let format = ExportFormat::parse(&params)?;
    render(&state, definition, &params, format, Some(principal.user_id), false).await
}

#[utoipa::path(
    post,
    path = "/api/v1.0/admin/report/{group}/{alias}/csv-link",
    tag = "Reports",
    security(("bearerAuth" = [])),
    params(
        ("group" = String, Path, description = "Report group"),
        ("alias" = String, Path, description = "Report alias")
    ),
    responses(
        (status = 201, description = "Link issued", body = IssuedLink),
        (status = 400, description = "Invalid report filter"),
        (status = 404, description = "Unknown report (code 627)")
    )
)]
pub async fn csv_link(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((group, alias)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Envelope> {
    let definition = state.reports.find(&group, &alias)?;
    ensure_definition_grant(&state, &principal, definition).await?;

    // a link must never capture a filter the report would reject later
    for filter in &definition.filters {
        filter.value(&params)?;
    }

    let view = csv_view::issue(
        &state.pool,
        definition.group,
        definition.alias,
        &params,
        state.clock.now(),
        state.settings.csv_link_ttl_secs,
    )
    .await?;

    let expires_at = Utc
        .timestamp_opt(view.expires_at, 0)
        .single()
        .ok_or_else(|| AppError::internal("link expiry out of range"))?;
    let link = IssuedLink {
        url: format!("{}{}", state.settings.public_base_url, link_path(&view.hash)),
        hash: view.hash,
        expires_at: format_timestamp(expires_at),
    };

    let data = serde_json::to_value(link).map_err(|e| AppError::internal(format!("link encode: {e}")))?;
    Ok(Envelope::created(data))
}

#[utoipa::path(
    get,
    path = "/api/v1.0/report/csv-view/{hash}",
    tag = "Reports",
    params(("hash" = String, Path, description = "Link hash ([a-z0-9]+)")),
    responses(
        (status = 200, description = "CSV file (text/csv)"),
        (status = 404, description = "Unknown link (code 625)"),
        (status = 410, description = "Expired link (code 626)")
    )
)]
pub async fn report_csv_view(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<ActionResponse> {
    if !is_valid_hash(&hash) {
        return Err(AppError::validation("invalid link hash"));
    }

    let resolved = csv_view::lookup(&state.pool, &hash, state.clock.now())
        .await?
        .resolve(params)?;
    let definition = state.reports.find(&resolved.group, &resolved.alias)?;

    render(&state, definition, &resolved.params, ExportFormat::Csv, None, true).await
}
