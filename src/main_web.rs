// Gen Studio web server
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use log::info;

use gen_studio::config::ServerConfig;
use gen_studio::logging::setup_logging;
use gen_studio::web::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| PathBuf::from(&w[1]));

    let config = ServerConfig::load(config_path.as_deref()).context("failed to load configuration")?;

    match setup_logging(&config.log_dir, config.debug) {
        Ok(path) => info!("Logging to {}", path.display()),
        Err(e) => eprintln!("Failed to set up logging: {e}"),
    }

    let addr = tokio::net::lookup_host(config.bind_address())
        .await
        .with_context(|| format!("cannot resolve {}", config.bind_address()))?
        .next()
        .ok_or_else(|| anyhow!("no address for {}", config.bind_address()))?;

    info!(
        "Starting Gen Studio on {addr} (debug={}, video format={})",
        config.debug,
        config.video_format.extension()
    );

    let service = gen_studio::build_service(&config);
    let state = Arc::new(AppState::new(config, service));
    web::run(addr, state).await.context("server error")?;

    Ok(())
}
