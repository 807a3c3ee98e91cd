use std::fs;
use std::sync::Arc;

use admin_api::resources::default_registry;
use admin_api::utils::SystemClock;

/// Writes the OpenAPI document to the path given as the first argument
/// (default `openapi.json`).
fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "openapi.json".to_string());
    let port = admin_api::config::app_port();

    let registry = default_registry(Arc::new(SystemClock))?;
    let doc = admin_api::docs::build_openapi(&registry, port)?;
    fs::write(&path, serde_json::to_string_pretty(&doc)?)?;

    println!("wrote {path}");
    Ok(())
}
