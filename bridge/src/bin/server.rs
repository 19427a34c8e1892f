use tokio::signal;
use tracing::info;

use aquanet_bridge::Bridge;
use aquanet_core::telemetry::{init_logging, DEFAULT_LOG_FILTER};
use aquanet_core::MonitorConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_logging(DEFAULT_LOG_FILTER);

    // Defaults + env + optional TOML overlay
    let config = MonitorConfig::load();
    let bridge = Bridge::new(config)?;

    if let Err(e) = bridge.refresh_graph().await {
        tracing::warn!(target: "bridge", error = %e, "Initial graph fetch failed; starting with an empty diagram");
    }

    tokio::select! {
        result = bridge.run() => result?,
        _ = signal::ctrl_c() => info!(target: "bridge", "Shutting down AquaNet bridge"),
    }

    Ok(())
}
