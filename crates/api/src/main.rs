//! SkinAI - Main Entry Point

use api::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;
    init_logging(&settings.logging)?;

    info!("=== SkinAI v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Provisioning skin classifier from {}", settings.model.source);

    run_server(settings).await?;

    Ok(())
}
