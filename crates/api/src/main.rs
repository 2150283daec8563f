//! Windwatch - Main Entry Point

use api::{init_logging, run_server, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("=== Windwatch v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Polling {} stations",
        config
            .stations
            .as_ref()
            .map_or_else(|| "built-in".to_string(), |s| s.len().to_string())
    );

    run_server(config).await
}
