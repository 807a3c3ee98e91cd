use std::sync::Arc;

use serde_json::{json, Value};

use super::action::{ResourceAction, RouteBinding, ADMIN_PREFIX};
use crate::errors::{AppError, AppResult};
use crate::services::schema::{TableSpec, View};
use crate::services::{Entity, ResourceService};

/// Path segments owned by non-resource admin routes.
const RESERVED_NAMES: [&str; 1] = ["report"];

/// Per-resource row of the dispatch table.
pub struct ResourceDescriptor {
    /// Path segment under the admin prefix, e.g. `expense-category`.
    pub name: &'static str,
    pub grant_key: &'static str,
    pub actions: Vec<ResourceAction>,
    pub service: Arc<dyn ResourceService>,
}

impl ResourceDescriptor {
    /// A descriptor exposing the full resource action set.
    pub fn new(name: &'static str, grant_key: &'static str, service: Arc<dyn ResourceService>) -> Self {
        Self {
            name,
            grant_key,
            actions: ResourceAction::RESOURCE_ACTIONS.to_vec(),
            service,
        }
    }

    pub fn with_actions(mut self, actions: &[ResourceAction]) -> Self {
        self.actions = actions.to_vec();
        self
    }

    pub fn schema(&self) -> &TableSpec {
        self.service.schema()
    }

    pub fn base_path(&self) -> String {
        format!("{ADMIN_PREFIX}/{}", self.name)
    }

    pub fn supports(&self, action: ResourceAction) -> bool {
        self.actions.contains(&action)
    }

    /// Serialization group for a view, e.g. `api_admin_expense_category_get`.
    pub fn group(&self, view: View) -> String {
        format!("api_admin_{}_{}", self.name.replace('-', "_"), view.suffix())
    }

    pub fn bindings(&self) -> Vec<RouteBinding> {
        let base = self.base_path();
        self.actions
            .iter()
            .filter_map(|action| {
                let (method, suffix) = action.route()?;
                let mut binding = RouteBinding::new(method, format!("{base}{suffix}"), *action);
                if let Some(level) = action.grant_level() {
                    binding = binding.requires(self.grant_key, level);
                }
                Some(binding)
            })
            .collect()
    }

    /// Keeps only the columns emitted in `view`.
    pub fn project(&self, entity: &Entity, view: View) -> Entity {
        self.schema()
            .view_columns(view)
            .filter_map(|column| entity.get(column.name).map(|value| (column.name.to_string(), value.clone())))
            .collect()
    }

    /// Column metadata for GridOptions.
    pub fn column_options(&self, view: View) -> Value {
        let columns: Vec<Value> = self
            .schema()
            .view_columns(view)
            .map(|column| {
                json!({
                    "name": column.name,
                    "type": column.kind,
                    "required": column.required,
                    "writable": column.writable,
                    "sortable": column.sortable,
                    "filterable": column.filterable,
                })
            })
            .collect();

        json!({
            "resource": self.name,
            "group": self.group(view),
            "default_sort": self.schema().default_sort,
            "columns": columns,
        })
    }
}

/// All registered resources, in registration order.
#[derive(Default)]
pub struct ResourceRegistry {
    descriptors: Vec<Arc<ResourceDescriptor>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor. Two resources claiming the same path is a
    /// conflict, as is a resource shadowing a reserved admin segment.
    pub fn register(&mut self, descriptor: ResourceDescriptor) -> AppResult<()> {
        if RESERVED_NAMES.contains(&descriptor.name) {
            return Err(AppError::conflict(format!("resource path '{}' is reserved", descriptor.name)));
        }
        if self.get(descriptor.name).is_some() {
            return Err(AppError::conflict(format!(
                "route collision: '{}' is already registered",
                descriptor.base_path()
            )));
        }
        if let Some(action) = descriptor.actions.iter().find(|action| action.route().is_none()) {
            return Err(AppError::configuration(format!(
                "resource '{}' cannot expose {action}",
                descriptor.name
            )));
        }

        tracing::debug!(resource = descriptor.name, actions = descriptor.actions.len(), "resource registered");
        self.descriptors.push(Arc::new(descriptor));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ResourceDescriptor>> {
        self.descriptors.iter().find(|descriptor| descriptor.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResourceDescriptor>> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn bindings(&self) -> Vec<RouteBinding> {
        self.descriptors.iter().flat_map(|descriptor| descriptor.bindings()).collect()
    }
}
