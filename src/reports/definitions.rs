use super::{ReportCatalog, ReportDefinition, ReportFilter};
use crate::authz::{GrantLevel, GrantRequirement};
use crate::errors::AppResult;
use crate::services::schema::ColumnKind;

fn expenses_by_category() -> ReportDefinition {
    ReportDefinition {
        group: "finance",
        alias: "expenses-by-category",
        title: "Expenses by category",
        select: "SELECT COALESCE(c.name, '(uncategorized)') AS category, COUNT(e.id) AS expenses, \
                 COALESCE(SUM(e.amount), 0) AS total \
                 FROM expenses e LEFT JOIN expense_categories c ON c.id = e.category_id",
        columns: vec![
            ("category", ColumnKind::Text),
            ("expenses", ColumnKind::Integer),
            ("total", ColumnKind::Real),
        ],
        filters: vec![
            ReportFilter::new("from", "e.spent_on", ">=", ColumnKind::Date),
            ReportFilter::new("to", "e.spent_on", "<=", ColumnKind::Date),
            ReportFilter::new("category_id", "e.category_id", "=", ColumnKind::Integer),
        ],
        tail: " GROUP BY e.category_id ORDER BY total DESC, category ASC",
        grant: Some(GrantRequirement::new("expense", GrantLevel::View)),
    }
}

fn credits_summary() -> ReportDefinition {
    ReportDefinition {
        group: "finance",
        alias: "credits-summary",
        title: "Credits per currency",
        select: "SELECT currency, COUNT(*) AS credits, COALESCE(SUM(amount), 0) AS total FROM credits",
        columns: vec![
            ("currency", ColumnKind::Text),
            ("credits", ColumnKind::Integer),
            ("total", ColumnKind::Real),
        ],
        filters: vec![
            ReportFilter::new("active", "active", "=", ColumnKind::Bool),
            ReportFilter::new("currency", "currency", "=", ColumnKind::Text),
        ],
        tail: " GROUP BY currency ORDER BY currency ASC",
        grant: Some(GrantRequirement::new("credit", GrantLevel::View)),
    }
}

fn report_usage() -> ReportDefinition {
    ReportDefinition {
        group: "audit",
        alias: "report-usage",
        title: "Report renders",
        select: "SELECT group_name, alias, COUNT(*) AS renders, SUM(from_csv_hash) AS via_link, \
                 MAX(created_at) AS last_rendered_at FROM report_logs",
        columns: vec![
            ("group_name", ColumnKind::Text),
            ("alias", ColumnKind::Text),
            ("renders", ColumnKind::Integer),
            ("via_link", ColumnKind::Integer),
            ("last_rendered_at", ColumnKind::Timestamp),
        ],
        // created_at is RFC 3339 text, so a date prefix compares correctly
        filters: vec![ReportFilter::new("from", "created_at", ">=", ColumnKind::Date)],
        tail: " GROUP BY group_name, alias ORDER BY renders DESC, group_name ASC, alias ASC",
        grant: Some(GrantRequirement::new("report-log", GrantLevel::View)),
    }
}

pub fn default_catalog() -> AppResult<ReportCatalog> {
    let mut catalog = ReportCatalog::new();
    for definition in [expenses_by_category(), credits_summary(), report_usage()] {
        catalog.register(definition)?;
    }
    Ok(catalog)
}
