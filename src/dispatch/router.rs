use std::convert::Infallible;
use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, options, post, put, MethodRouter};
use axum::{Extension, Router};

use super::action::{ResourceAction, RouteBinding};
use super::handlers;
use crate::app::AppState;
use crate::authz::middleware::enforce_grant;

fn handler_for(action: ResourceAction) -> Option<MethodRouter<AppState>> {
    let router = match action {
        ResourceAction::Grid => get(handlers::grid),
        ResourceAction::GridOptions => options(handlers::grid_options),
        ResourceAction::List => get(handlers::list),
        ResourceAction::Get => get(handlers::get_one),
        ResourceAction::Add => post(handlers::add),
        ResourceAction::Edit => put(handlers::edit),
        ResourceAction::Delete => delete(handlers::delete_one),
        ResourceAction::DeleteBulk => delete(handlers::delete_bulk),
        ResourceAction::RelatedInfo => post(handlers::related_info),
        ResourceAction::Report | ResourceAction::ReportCsvView => return None,
    };
    Some(router)
}

/// Wraps a method router so the binding is visible to the grant middleware,
/// which runs before any of the handler's extractors.
pub fn guarded(state: &AppState, binding: RouteBinding, router: MethodRouter<AppState>) -> MethodRouter<AppState> {
    router
        .layer::<_, Infallible>(from_fn_with_state(state.clone(), enforce_grant))
        .layer(Extension(Arc::new(binding)))
}

/// One route per binding of every registered resource.
pub fn resource_routes(state: &AppState) -> Router<AppState> {
    let mut router = Router::new();

    for resource in state.registry.iter() {
        for binding in resource.bindings() {
            let Some(handler) = handler_for(binding.action) else {
                continue;
            };
            let path = binding.path.clone();
            let route = guarded(state, binding, handler).layer(Extension(Arc::clone(resource)));
            router = router.route(&path, route);
        }
    }

    router
}
