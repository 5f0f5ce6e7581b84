use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use lumen_server::state::AppState;
use lumen_store::MemoryStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lumen=info".parse()?),
        )
        .json()
        .init();

    let cfg = lumen_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // Log a warning (not panic) if the GeoIP database is absent — events
    // are folded with empty geo dimensions.
    if !std::path::Path::new(&cfg.geoip_path).exists() {
        tracing::warn!(
            geoip_path = %cfg.geoip_path,
            "GeoIP database not found. Events folded without geo dimensions. \
             Set LUMEN_GEOIP_PATH to a MaxMind City database to enable them."
        );
    }

    if cfg.dev_mode {
        info!("Development mode: localhost origins accepted at /api/collect");
    }

    // The self-hosted default keeps all aggregates in process memory. A
    // durable deployment swaps in another KvStore implementation here.
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(store, cfg.clone()));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = lumen_server::app::build_app(Arc::clone(&state));

    info!(port = cfg.port, "Lumen listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
