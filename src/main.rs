use std::net::SocketAddr;

use admin_api::{app, config, db, docs};
use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let pool = db::init().await?;
    let state = app::AppState::new(
        pool,
        admin_api::jwt::JwtConfig::from_env()?,
        config::Settings::from_env()?,
    )?;

    let port = config::app_port();
    let openapi = docs::build_openapi(&state.registry, port)?;
    let app = app::build_router(state).merge(docs::swagger_routes(openapi));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    match tls_paths() {
        Some((cert, key)) => {
            let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(&cert, &key)
                .await
                .with_context(|| format!("failed to load TLS material from {cert} / {key}"))?;
            tracing::info!(%addr, "listening (tls)");
            axum_server::bind_rustls(addr, tls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            tracing::info!(%addr, "listening");
            axum_server::bind(addr).serve(app.into_make_service()).await?;
        }
    }

    Ok(())
}

/// Both `TLS_CERT_PATH` and `TLS_KEY_PATH` must be set to enable TLS.
fn tls_paths() -> Option<(String, String)> {
    let cert = std::env::var("TLS_CERT_PATH").ok().filter(|v| !v.is_empty())?;
    let key = std::env::var("TLS_KEY_PATH").ok().filter(|v| !v.is_empty())?;
    Some((cert, key))
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
