// State Registry - Web Server
// Stage triggers + state queries over HTTP

use anyhow::{Context, Result};
use state_registry::{api, init_tracing, Config, Pipeline, VERSION};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    let pipeline = Pipeline::from_config(&config)?;
    info!(
        database = %config.database_path.display(),
        data_dir = %config.data_dir.display(),
        source = %config.source_url,
        uniqueness = %config.uniqueness,
        version = VERSION,
        "pipeline ready"
    );

    let app = api::router(Arc::new(pipeline));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "server listening");

    axum::serve(listener, app)
        .await
        .context("Server terminated")?;

    Ok(())
}
