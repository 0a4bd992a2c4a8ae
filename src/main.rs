use anyhow::{Context, Result};
use facility_planner::{api, config::Config, controller::AppState, telemetry};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;
    telemetry::init_tracing(&cfg.log);

    let state = AppState::new(cfg.clone())
        .await
        .context("failed to initialise application state")?;
    let app = api::router(state.clone(), &cfg);

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0; the API is reachable from the network");
    }
    info!(%addr, "starting facility planner");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            telemetry::shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    warn!("shutdown complete");
    Ok(())
}
