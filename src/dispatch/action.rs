use std::fmt;

use axum::http::Method;
use serde::Serialize;

use crate::authz::{GrantLevel, GrantRequirement};

pub const ADMIN_PREFIX: &str = "/api/v1.0/admin";

/// Behaviour class of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceAction {
    List,
    Grid,
    GridOptions,
    Get,
    Add,
    Edit,
    Delete,
    DeleteBulk,
    RelatedInfo,
    Report,
    ReportCsvView,
}

impl ResourceAction {
    /// Every action a table-backed resource can expose, in route-table order.
    pub const RESOURCE_ACTIONS: [ResourceAction; 9] = [
        ResourceAction::Grid,
        ResourceAction::GridOptions,
        ResourceAction::List,
        ResourceAction::Get,
        ResourceAction::Add,
        ResourceAction::Edit,
        ResourceAction::Delete,
        ResourceAction::DeleteBulk,
        ResourceAction::RelatedInfo,
    ];

    pub const READ_ONLY: [ResourceAction; 4] = [
        ResourceAction::Grid,
        ResourceAction::GridOptions,
        ResourceAction::List,
        ResourceAction::Get,
    ];

    /// Method and path suffix (relative to the resource base path).
    /// Report actions are bound by the report module and return `None`.
    pub fn route(&self) -> Option<(Method, &'static str)> {
        let route = match self {
            ResourceAction::Grid => (Method::GET, "/grid"),
            ResourceAction::GridOptions => (Method::OPTIONS, "/grid"),
            ResourceAction::List => (Method::GET, ""),
            ResourceAction::Get => (Method::GET, "/:id"),
            ResourceAction::Add => (Method::POST, ""),
            ResourceAction::Edit => (Method::PUT, "/:id"),
            ResourceAction::Delete => (Method::DELETE, "/:id"),
            ResourceAction::DeleteBulk => (Method::DELETE, ""),
            ResourceAction::RelatedInfo => (Method::POST, "/related/info"),
            ResourceAction::Report | ResourceAction::ReportCsvView => return None,
        };
        Some(route)
    }

    /// Grant level a resource route declares for this action.
    pub fn grant_level(&self) -> Option<GrantLevel> {
        match self {
            ResourceAction::List
            | ResourceAction::Grid
            | ResourceAction::Get
            | ResourceAction::RelatedInfo => Some(GrantLevel::View),
            ResourceAction::Add => Some(GrantLevel::Add),
            ResourceAction::Edit => Some(GrantLevel::Edit),
            ResourceAction::Delete | ResourceAction::DeleteBulk => Some(GrantLevel::Delete),
            ResourceAction::GridOptions | ResourceAction::Report | ResourceAction::ReportCsvView => None,
        }
    }
}

impl fmt::Display for ResourceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One registered endpoint. Built once at startup and shared read-only with
/// the grant middleware through a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteBinding {
    pub method: Method,
    pub path: String,
    pub action: ResourceAction,
    pub required_grant: Option<GrantRequirement>,
    /// Public bindings skip authentication entirely.
    pub public: bool,
}

impl RouteBinding {
    pub fn new(method: Method, path: impl Into<String>, action: ResourceAction) -> Self {
        Self {
            method,
            path: path.into(),
            action,
            required_grant: None,
            public: false,
        }
    }

    pub fn requires(mut self, grant_key: impl Into<String>, level: GrantLevel) -> Self {
        self.required_grant = Some(GrantRequirement::new(grant_key, level));
        self
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    /// Path in OpenAPI form (`{id}` instead of `:id`).
    pub fn openapi_path(&self) -> String {
        self.path
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => format!("{{{name}}}"),
                None => segment.to_string(),
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for RouteBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let grant = match (&self.required_grant, self.public) {
            (Some(requirement), _) => requirement.to_string(),
            (None, true) => "public".to_string(),
            (None, false) => "-".to_string(),
        };
        write!(f, "{:<8} {:<60} {:<14} {}", self.method, self.path, self.action, grant)
    }
}
