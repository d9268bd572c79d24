use anyhow::Context;
use finedu_backend::{AppConfig, AppContext};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// One sync pass from the command line: drain the pending queue and, when a
/// parent is signed in on this device, credit any due weekly allowance.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("Failed to read configuration")?;
    info!(
        "Starting finedu sync (mode: {}, data dir: {})",
        config.backend_mode.as_str(),
        config.data_dir.display()
    );

    let context = AppContext::new(config)?;
    let handles = context.bootstrap();

    match handles.startup.await {
        Ok(credited) => info!("Startup finished, {} allowances credited", credited),
        Err(e) => warn!("Startup task did not finish: {}", e),
    }
    handles.reconnect.abort();

    let pending = context.sync.pending_count()?;
    if pending > 0 {
        warn!("{} queued writes are still waiting for the server", pending);
    } else {
        info!("Sync queue is empty");
    }

    Ok(())
}
