//! Table-driven route dispatch.
//!
//! Each [`ResourceDescriptor`] expands into a fixed set of [`RouteBinding`]s;
//! [`router::resource_routes`] turns those into axum routes guarded by the
//! grant middleware and served by the generic handlers.

mod action;
mod extract;
pub mod handlers;
mod registry;
pub mod router;

pub use action::{ResourceAction, RouteBinding, ADMIN_PREFIX};
pub use extract::{parse_numeric_id, JsonBody, NumericId};
pub use registry::{ResourceDescriptor, ResourceRegistry};
