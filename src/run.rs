/// Server process lifecycle
///
/// Loads configuration, builds the hub, starts the optional demo source and
/// the webserver, then waits for Ctrl-C and shuts everything down in order:
/// stop accepting upgrades, close every client, stop the sources.
use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    arguments,
    config::{self, Config},
    logger::{self, LogTag},
    webserver::{
        self,
        ws::{sources, Hub},
    },
};

/// Main server execution function
pub async fn run_server() -> Result<(), String> {
    let config_path = arguments::get_config_path();
    config::load_config_from_path(&config_path).map_err(|e| e.to_string())?;

    let mut cfg: Config = config::get_config_clone();
    if let Some(port) = arguments::get_port_override() {
        logger::info(LogTag::System, &format!("CLI override: Using port {}", port));
        cfg.server.port = port;
    }

    run_with_config(cfg).await
}

/// Run the hub and webserver with an already resolved configuration
pub async fn run_with_config(cfg: Config) -> Result<(), String> {
    let hub = Hub::with_limit(cfg.hub.clone(), cfg.server.max_connections);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let demo = if arguments::is_demo_enabled() {
        Some(sources::demo::start(
            hub.clone(),
            cfg.demo.clone(),
            shutdown_rx.clone(),
        ))
    } else {
        None
    };

    let mut server = tokio::spawn(webserver::start_server(
        cfg.server.clone(),
        hub.clone(),
        shutdown_rx,
    ));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                logger::error(LogTag::System, &format!("Failed to listen for Ctrl-C: {}", e));
            }
            logger::info(LogTag::System, "Shutdown requested");
        }
        // The server only returns early when it failed to start
        joined = &mut server => return flatten(joined),
    }

    shutdown(&hub, shutdown_tx).await;
    flatten(server.await)?;

    if let Some(demo) = demo {
        let _ = demo.await;
    }
    Ok(())
}

fn flatten(joined: Result<Result<(), String>, tokio::task::JoinError>) -> Result<(), String> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(format!("Webserver task failed: {}", e)),
    }
}

async fn shutdown(hub: &Arc<Hub>, shutdown_tx: watch::Sender<bool>) {
    shutdown_tx.send_replace(true);
    hub.shutdown_all().await;

    let metrics = hub.metrics().snapshot();
    match serde_json::to_string(&metrics) {
        Ok(json) => logger::info(LogTag::System, &format!("Hub metrics: {}", json)),
        Err(e) => logger::warning(LogTag::System, &format!("Hub metrics unavailable: {}", e)),
    }
}
