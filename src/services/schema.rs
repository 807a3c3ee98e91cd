use serde::Serialize;

/// Storage/serialization kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
    Bool,
    /// `YYYY-MM-DD` stored as text.
    Date,
    /// RFC 3339 UTC stored as text; only ever written by the service.
    Timestamp,
}

/// Serialization view. Each resource exposes one group per view, named
/// `api_admin_<resource>_<view>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Get,
    List,
    Grid,
}

impl View {
    pub const ALL: [View; 3] = [View::Get, View::List, View::Grid];

    pub fn suffix(&self) -> &'static str {
        match self {
            View::Get => "get",
            View::List => "list",
            View::Grid => "grid",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        View::ALL.into_iter().find(|view| view.suffix() == raw)
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub required: bool,
    pub writable: bool,
    pub sortable: bool,
    pub filterable: bool,
    pub views: Vec<View>,
}

impl ColumnSpec {
    /// Optional, writable, sortable, filterable, visible in every view.
    pub fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            writable: true,
            sortable: true,
            filterable: true,
            views: View::ALL.to_vec(),
        }
    }

    pub fn id() -> Self {
        Self::new("id", ColumnKind::Integer).read_only()
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn unsortable(mut self) -> Self {
        self.sortable = false;
        self
    }

    pub fn unfilterable(mut self) -> Self {
        self.filterable = false;
        self
    }

    pub fn views(mut self, views: &[View]) -> Self {
        self.views = views.to_vec();
        self
    }

    pub fn in_view(&self, view: View) -> bool {
        self.views.contains(&view)
    }
}

/// A column in another table that stores this resource's id.
#[derive(Debug, Clone)]
pub struct Reference {
    pub resource: &'static str,
    pub table: &'static str,
    pub column: &'static str,
}

#[derive(Debug, Clone)]
pub struct TableSpec {
    pub table: &'static str,
    pub columns: Vec<ColumnSpec>,
    pub references: Vec<Reference>,
    /// Maintain `created_at`/`updated_at` on writes.
    pub timestamps: bool,
    pub default_sort: &'static str,
}

impl TableSpec {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            columns: vec![ColumnSpec::id()],
            references: Vec::new(),
            timestamps: false,
            default_sort: "id",
        }
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_timestamps(mut self) -> Self {
        self.timestamps = true;
        self.columns.push(
            ColumnSpec::new("created_at", ColumnKind::Timestamp)
                .read_only()
                .views(&[View::Get, View::Grid]),
        );
        self.columns.push(
            ColumnSpec::new("updated_at", ColumnKind::Timestamp)
                .read_only()
                .views(&[View::Get]),
        );
        self
    }

    pub fn referenced_by(mut self, resource: &'static str, table: &'static str, column: &'static str) -> Self {
        self.references.push(Reference { resource, table, column });
        self
    }

    pub fn sorted_by(mut self, column: &'static str) -> Self {
        self.default_sort = column;
        self
    }

    pub fn find(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn select_list(&self) -> String {
        self.columns
            .iter()
            .map(|column| column.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn view_columns(&self, view: View) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(move |column| column.in_view(view))
    }
}
