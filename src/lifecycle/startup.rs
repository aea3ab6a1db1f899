//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging and metrics
//! - Compile the route table
//! - Bind the listener, start the config watcher and serve
//!
//! # Design Decisions
//! - Fail fast: config and route table errors are fatal
//! - A metrics endpoint that cannot start is logged, not fatal
//! - Listener binds last (traffic only when ready)

use std::path::Path;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{load_config, ConfigError, ConfigWatcher};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_listener;
use crate::observability::{logging, metrics};
use crate::routing::RouteError;

/// Config file used when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "router.toml";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("route table: {0}")]
    Routes(#[from] RouteError),

    #[error("listener: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the router from the config file at `path` and serve until a
/// termination signal arrives.
pub async fn run(path: &Path) -> Result<(), StartupError> {
    let config = load_config(path)?;
    logging::init(config.observability.log_filter.as_deref());

    tracing::info!(
        path = %path.display(),
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        max_depth = config.routing.max_depth,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::from_config(config)?;

    let (watcher, updates) = ConfigWatcher::new(path);
    // Dropping the watcher ends the watch, so it lives until run returns.
    let _watcher = match watcher.run() {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };
    let reloads = server.apply_updates(updates);

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());
    server.run(listener, shutdown.subscribe()).await?;

    reloads.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}
