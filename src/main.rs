use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod config;
mod error;
mod models;
mod routes;
mod seed;
mod store;
mod uploads;


use auth::{HttpIdentityProvider, IdentityProvider};
use config::Config;
use store::Store;

/// Everything a request handler may touch.
/// Built once in `main` and cloned into each request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub identity: Arc<dyn IdentityProvider>,
    pub upload_dir: PathBuf,
    pub session_ttl: chrono::Duration,
    pub max_upload_bytes: usize,
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .try_init()?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = Config::parse();

    let store = Store::open(&config.database_path)
        .with_context(|| format!("opening database at {}", config.database_path))?;
    seed::seed_catalog(&store).context("seeding interview catalog")?;

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("creating upload directory {}", config.upload_dir.display()))?;

    let state = AppState {
        store: Arc::new(store),
        identity: Arc::new(HttpIdentityProvider::new(config.auth_session_url.clone())),
        upload_dir: config.upload_dir.clone(),
        session_ttl: chrono::Duration::days(config.session_ttl_days),
        max_upload_bytes: config.max_upload_bytes,
    };

    let app = routes::router(state).layer(routes::cors_layer(&config.cors_origin_list()));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("Server running on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
