use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

use crate::authz::{DefaultPolicyEvaluator, PolicyEvaluator};
use crate::config::Settings;
use crate::cors::AdminCorsLayer;
use crate::dispatch::router::resource_routes;
use crate::dispatch::{ResourceRegistry, RouteBinding};
use crate::errors::{AppError, AppResult};
use crate::jwt::JwtConfig;
use crate::reports::handlers::{report_bindings, report_routes};
use crate::reports::{default_catalog, ReportCatalog};
use crate::resources::default_registry;
use crate::routes::{auth, health};
use crate::utils::{Clock, SystemClock};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub settings: Arc<Settings>,
    pub evaluator: Arc<dyn PolicyEvaluator>,
    pub registry: Arc<ResourceRegistry>,
    pub reports: Arc<ReportCatalog>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, settings: Settings) -> AppResult<Self> {
        Self::with_clock(pool, jwt, settings, Arc::new(SystemClock))
    }

    /// Same as [`AppState::new`] with an explicit time source.
    pub fn with_clock(pool: SqlitePool, jwt: JwtConfig, settings: Settings, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let registry = default_registry(Arc::clone(&clock))?;
        let reports = default_catalog()?;

        Ok(Self {
            pool,
            jwt: Arc::new(jwt),
            settings: Arc::new(settings),
            evaluator: Arc::new(DefaultPolicyEvaluator::new()),
            registry: Arc::new(registry),
            reports: Arc::new(reports),
            clock,
        })
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let settings = Settings::from_env()?;
    let state = AppState::new(pool, jwt_config, settings)?;

    Ok(build_router(state))
}

pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    tracing::info!(
        resources = state.registry.len(),
        reports = state.reports.len(),
        "building router"
    );

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/api/v1.0/auth", auth_routes)
        .merge(resource_routes(&state))
        .merge(report_routes(&state))
        .with_state(state)
        .layer(AdminCorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Every dispatched binding: registered resources first, then reports.
pub fn route_table(registry: &ResourceRegistry) -> Vec<RouteBinding> {
    let mut bindings = registry.bindings();
    bindings.extend(report_bindings());
    bindings
}
