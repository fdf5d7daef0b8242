// =============================================================================
// Wave Engine — Main Entry Point
// =============================================================================
//
// Loads the runtime config and the bar histories on disk, then serves the
// analysis API until Ctrl+C.
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wave_engine::api;
use wave_engine::app_state::AppState;
use wave_engine::runtime_config::RuntimeConfig;

const CONFIG_PATH: &str = "wave_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Wave Engine — Starting Up                        ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    if let Ok(addr) = std::env::var("WAVE_BIND_ADDR") {
        config.server.bind_addr = addr;
    }
    if let Ok(dir) = std::env::var("WAVE_DATA_DIR") {
        config.server.data_dir = dir;
    }
    if let Err(e) = config.analysis.validate() {
        warn!(error = %e, "Configured analysis parameters are unusable, using defaults");
        config.analysis = Default::default();
    }

    let bind_addr = config.server.bind_addr.clone();
    let data_dir = config.server.data_dir.clone();

    // ── 2. Shared state ──────────────────────────────────────────────────
    let admin_token = std::env::var("WAVE_ADMIN_TOKEN").ok();
    if admin_token.as_deref().map_or(true, |t| t.trim().is_empty()) {
        warn!("WAVE_ADMIN_TOKEN is not set, history upload and config updates are disabled");
    }
    let state = Arc::new(
        AppState::new(config, Some(PathBuf::from(CONFIG_PATH))).with_admin_token(admin_token),
    );

    // ── 3. Price histories ───────────────────────────────────────────────
    let loaded = state
        .store
        .load_dir(&data_dir)
        .with_context(|| format!("failed to load price histories from {data_dir}"))?;
    info!(symbols = loaded, dir = %data_dir, "Price histories loaded");

    // ── 4. API server ────────────────────────────────────────────────────
    let app = api::rest::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening. Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            warn!("Shutdown signal received, stopping gracefully");
        })
        .await
        .context("API server failed")?;

    info!("Wave Engine shut down complete.");
    Ok(())
}
