//! Named report definitions, rendering, and expiring CSV export links.

pub mod csv_view;
mod definitions;
pub mod handlers;
mod render;

pub use definitions::default_catalog;
pub use render::{log_render, run_report, RenderedReport};

use std::collections::HashMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::authz::GrantRequirement;
use crate::errors::{AppError, AppResult};
use crate::services::query::{coerce_param, SqlValue};
use crate::services::schema::ColumnKind;

/// A query parameter a report understands, mapped onto a SQL predicate.
#[derive(Debug, Clone)]
pub struct ReportFilter {
    pub param: &'static str,
    /// Left-hand side of the predicate, e.g. `e.spent_on`.
    pub expr: &'static str,
    /// Comparison operator: `=`, `>=`, `<=`.
    pub op: &'static str,
    pub kind: ColumnKind,
}

impl ReportFilter {
    pub fn new(param: &'static str, expr: &'static str, op: &'static str, kind: ColumnKind) -> Self {
        Self { param, expr, op, kind }
    }

    /// Typed value for this filter, or `None` when the parameter is absent or blank.
    pub fn value(&self, params: &HashMap<String, String>) -> AppResult<Option<SqlValue>> {
        match params.get(self.param).map(|raw| raw.trim()) {
            None | Some("") => Ok(None),
            Some(raw) => coerce_param(self.param, self.kind, raw).map(Some),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportDefinition {
    pub group: &'static str,
    pub alias: &'static str,
    pub title: &'static str,
    /// `SELECT ... FROM ...` without a `WHERE` clause.
    pub select: &'static str,
    pub columns: Vec<(&'static str, ColumnKind)>,
    pub filters: Vec<ReportFilter>,
    /// Appended after the filters, e.g. `GROUP BY ... ORDER BY ...`.
    pub tail: &'static str,
    /// Checked on the authenticated route; a CSV link carries its own authorization.
    pub grant: Option<GrantRequirement>,
}

impl ReportDefinition {
    pub fn key(&self) -> String {
        format!("{}/{}", self.group, self.alias)
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            group: self.group.to_string(),
            alias: self.alias.to_string(),
            title: self.title.to_string(),
            filters: self.filters.iter().map(|f| f.param.to_string()).collect(),
            columns: self.columns.iter().map(|(name, _)| name.to_string()).collect(),
        }
    }
}

/// Catalogue entry returned by the report list route.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReportSummary {
    pub group: String,
    pub alias: String,
    pub title: String,
    pub filters: Vec<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ReportCatalog {
    definitions: Vec<ReportDefinition>,
}

impl ReportCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: ReportDefinition) -> AppResult<()> {
        if self.get(definition.group, definition.alias).is_some() {
            return Err(AppError::conflict(format!("report '{}' is already registered", definition.key())));
        }
        self.definitions.push(definition);
        Ok(())
    }

    pub fn get(&self, group: &str, alias: &str) -> Option<&ReportDefinition> {
        self.definitions
            .iter()
            .find(|definition| definition.group == group && definition.alias == alias)
    }

    pub fn find(&self, group: &str, alias: &str) -> AppResult<&ReportDefinition> {
        self.get(group, alias)
            .ok_or_else(|| AppError::report_not_found(format!("{group}/{alias}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReportDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
