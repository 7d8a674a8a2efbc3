//! Cortex Server - Entry Point
//!
//! This binary starts the Cortex HTTP server.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cortex_core::{CortexConfig, EscalationRouter, server};

/// Reads `CORTEX_DEBUG` and `CORTEX_LOG_FORMAT` ahead of the full config load.
fn init_tracing() {
    let debug = std::env::var("CORTEX_DEBUG")
        .is_ok_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "t" | "true" | "yes"));
    let json = std::env::var("CORTEX_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let default = if debug { "cortex_core=debug,cortex_models=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn run(config: CortexConfig) -> anyhow::Result<()> {
    let addr = config.server.address;
    let router = Arc::new(
        EscalationRouter::from_config(config).context("Failed to initialize escalation router")?,
    );

    let served = server::run(Arc::clone(&router), addr, shutdown_signal()).await;
    let flushed = router.shutdown();

    served.context("Server error")?;
    flushed.context("Failed to flush performance logs")?;
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match CortexConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!(error = format!("{e:#}"), "Cortex server failed");
        std::process::exit(1);
    }
}
