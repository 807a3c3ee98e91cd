pub mod app;
pub mod authz;
pub mod config;
pub mod cors;
pub mod db;
pub mod dispatch;
pub mod docs;
pub mod envelope;
pub mod errors;
pub mod jwt;
pub mod models;
pub mod reports;
pub mod resources;
pub mod routes;
pub mod services;
pub mod utils;

// Re-export commonly used items for tests
pub use app::{build_router, create_app, AppState};
