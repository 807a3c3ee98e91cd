//! The admin resource table: one descriptor per administered entity.

use std::sync::Arc;

use crate::dispatch::{ResourceAction, ResourceDescriptor, ResourceRegistry};
use crate::errors::AppResult;
use crate::services::schema::{ColumnKind, ColumnSpec, TableSpec, View};
use crate::services::TableService;
use crate::utils::Clock;

fn credits() -> TableSpec {
    TableSpec::new("credits")
        .column(ColumnSpec::new("name", ColumnKind::Text).required())
        .column(ColumnSpec::new("amount", ColumnKind::Real).required())
        .column(ColumnSpec::new("currency", ColumnKind::Text).required())
        .column(ColumnSpec::new("issued_on", ColumnKind::Date))
        .column(ColumnSpec::new("active", ColumnKind::Bool))
        .column(
            ColumnSpec::new("note", ColumnKind::Text)
                .unsortable()
                .unfilterable()
                .views(&[View::Get]),
        )
        .with_timestamps()
        .referenced_by("expense", "expenses", "credit_id")
}

fn expense_categories() -> TableSpec {
    TableSpec::new("expense_categories")
        .column(ColumnSpec::new("name", ColumnKind::Text).required())
        .column(
            ColumnSpec::new("description", ColumnKind::Text)
                .unsortable()
                .views(&[View::Get, View::List]),
        )
        .with_timestamps()
        .sorted_by("name")
        .referenced_by("expense", "expenses", "category_id")
}

fn expenses() -> TableSpec {
    TableSpec::new("expenses")
        .column(ColumnSpec::new("title", ColumnKind::Text).required())
        .column(ColumnSpec::new("amount", ColumnKind::Real).required())
        .column(ColumnSpec::new("category_id", ColumnKind::Integer))
        .column(ColumnSpec::new("credit_id", ColumnKind::Integer))
        .column(ColumnSpec::new("spent_on", ColumnKind::Date).required())
        .with_timestamps()
}

fn payment_sources() -> TableSpec {
    TableSpec::new("payment_sources")
        .column(ColumnSpec::new("name", ColumnKind::Text).required())
        .with_timestamps()
        .referenced_by("payment-source-base-rate", "payment_source_base_rates", "payment_source_id")
}

fn source_base_rates() -> TableSpec {
    TableSpec::new("source_base_rates")
        .column(ColumnSpec::new("currency", ColumnKind::Text).required())
        .column(ColumnSpec::new("rate", ColumnKind::Real).required())
        .column(ColumnSpec::new("valid_from", ColumnKind::Date).required())
        .with_timestamps()
        .sorted_by("valid_from")
}

fn payment_source_base_rates() -> TableSpec {
    TableSpec::new("payment_source_base_rates")
        .column(ColumnSpec::new("payment_source_id", ColumnKind::Integer).required())
        .column(ColumnSpec::new("currency", ColumnKind::Text).required())
        .column(ColumnSpec::new("rate", ColumnKind::Real).required())
        .column(ColumnSpec::new("valid_from", ColumnKind::Date).required())
        .with_timestamps()
        .sorted_by("valid_from")
}

fn report_logs() -> TableSpec {
    TableSpec::new("report_logs")
        .column(ColumnSpec::new("group_name", ColumnKind::Text).read_only())
        .column(ColumnSpec::new("alias", ColumnKind::Text).read_only())
        .column(ColumnSpec::new("user_id", ColumnKind::Integer).read_only())
        .column(ColumnSpec::new("format", ColumnKind::Text).read_only())
        .column(ColumnSpec::new("from_csv_hash", ColumnKind::Bool).read_only())
        .column(ColumnSpec::new("created_at", ColumnKind::Timestamp).read_only())
        .sorted_by("created_at")
}

/// Builds the registry served under `/api/v1.0/admin`.
///
/// Grant keys equal the resource path segment.
pub fn default_registry(clock: Arc<dyn Clock>) -> AppResult<ResourceRegistry> {
    let table = |name: &'static str, spec: TableSpec| -> Arc<TableService> {
        Arc::new(TableService::new(name, spec, Arc::clone(&clock)))
    };

    let mut registry = ResourceRegistry::new();
    registry.register(ResourceDescriptor::new("credit", "credit", table("credit", credits())))?;
    registry.register(ResourceDescriptor::new(
        "expense-category",
        "expense-category",
        table("expense-category", expense_categories()),
    ))?;
    registry.register(
        ResourceDescriptor::new("expense", "expense", table("expense", expenses())).with_actions(&[
            ResourceAction::Grid,
            ResourceAction::GridOptions,
            ResourceAction::List,
            ResourceAction::Get,
            ResourceAction::Add,
            ResourceAction::Edit,
            ResourceAction::Delete,
            ResourceAction::DeleteBulk,
        ]),
    )?;
    registry.register(
        ResourceDescriptor::new("payment-source", "payment-source", table("payment-source", payment_sources()))
            .with_actions(&[ResourceAction::RelatedInfo]),
    )?;
    registry.register(
        ResourceDescriptor::new(
            "source-base-rate",
            "source-base-rate",
            table("source-base-rate", source_base_rates()),
        )
        .with_actions(&crud_without_related()),
    )?;
    registry.register(
        ResourceDescriptor::new(
            "payment-source-base-rate",
            "payment-source-base-rate",
            table("payment-source-base-rate", payment_source_base_rates()),
        )
        .with_actions(&crud_without_related()),
    )?;
    registry.register(
        ResourceDescriptor::new("report-log", "report-log", table("report-log", report_logs()))
            .with_actions(&ResourceAction::READ_ONLY),
    )?;

    Ok(registry)
}

fn crud_without_related() -> Vec<ResourceAction> {
    ResourceAction::RESOURCE_ACTIONS
        .into_iter()
        .filter(|action| *action != ResourceAction::RelatedInfo)
        .collect()
}
