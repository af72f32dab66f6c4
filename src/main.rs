use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use aleph_grid::core::config::AppConfig;
use aleph_grid::exchanges::PaperVenue;
use aleph_grid::{Config, EngineHandle, GridEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let loaded = Config::load(&path);

    // 1. Logger: RUST_LOG wins over the configured level
    let log_level = loaded
        .as_ref()
        .map(|c| c.app.log_level.clone())
        .unwrap_or_else(|_| AppConfig::default().log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    tracing::info!("Aleph Grid starting");

    // 2. Config
    let config = match loaded {
        Ok(config) => {
            info!(path = %path.display(), "Loaded config");
            config
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Falling back to default config");
            Config::default()
        }
    };

    // 3. Venue
    if config.venue.name != "paper" {
        anyhow::bail!("unsupported venue {:?}, only \"paper\" is built in", config.venue.name);
    }
    let venue = Arc::new(PaperVenue::new(config.venue.name.clone(), config.paper_instruments()?));

    // 4. Engine, stopped by Ctrl-C; SIGHUP re-reads the config and switches symbol
    let (mut engine, handle) = GridEngine::new(venue.clone(), &config);
    let driver = venue.drive_followed(handle.watch_symbol(), Duration::from_millis(500));

    #[cfg(unix)]
    tokio::spawn(reload_on_hangup(path.clone(), handle.clone()));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            handle.shutdown();
        }
    });

    let result = engine.run().await;
    driver.abort();
    result?;

    info!(cycles = engine.cycles(), "Stopped");
    Ok(())
}

/// Switch to the `venue.symbol` of a freshly read config on every SIGHUP.
/// The paper venue keeps the instrument rows it started with.
#[cfg(unix)]
async fn reload_on_hangup(path: PathBuf, handle: EngineHandle) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(hangups) => hangups,
        Err(e) => {
            warn!(error = %e, "SIGHUP reload unavailable");
            return;
        }
    };
    while hangups.recv().await.is_some() {
        match Config::load(&path) {
            Ok(config) => {
                info!(symbol = %config.venue.symbol, "Config reloaded");
                handle.switch_symbol(config.venue.symbol);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Config reload failed, keeping symbol"),
        }
    }
}
