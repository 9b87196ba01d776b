/// Axum webserver implementation
///
/// Server lifecycle: bind, serve until the shutdown signal flips, then stop
/// accepting upgrades. Live connections are closed through the hub.
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{
    config::ServerConfig,
    logger::{self, LogTag},
    webserver::{routes, state::AppState, ws::Hub},
};

/// Bind the listener, with a readable error for the common failures
pub async fn bind(addr: &str) -> Result<TcpListener, String> {
    TcpListener::bind(addr).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::AddrInUse => format!(
            "Failed to bind to {}: Address already in use\n\
             \n\
             Another envhub instance is probably running. Stop it or pick a\n\
             different port with --port <PORT> or ENVHUB_PORT.",
            addr
        ),
        std::io::ErrorKind::PermissionDenied => format!(
            "Failed to bind to {}: Permission denied\n\
             \n\
             Consider using a port above 1024 or running with appropriate permissions.",
            addr
        ),
        _ => format!("Failed to bind to {}: {}", addr, e),
    })
}

/// Serve on an already bound listener until `shutdown` becomes true
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), String> {
    let addr = listener
        .local_addr()
        .map_err(|e| format!("Listener has no local address: {}", e))?;
    let app = build_app(state.clone());

    logger::info(
        LogTag::Webserver,
        &format!("Listening on ws://{}{}", addr, state.server.ws_path),
    );

    let shutdown_signal = async move {
        while !*shutdown.borrow() {
            // A dropped sender also means shutdown
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        logger::debug(
            LogTag::Webserver,
            "Received shutdown signal, stopping webserver...",
        );
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    logger::info(
        LogTag::Webserver,
        &format!("Webserver stopped after {}s", state.uptime_seconds()),
    );
    Ok(())
}

/// Bind to the configured address and serve
///
/// This function blocks until the server is shut down.
pub async fn start_server(
    config: ServerConfig,
    hub: Arc<Hub>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), String> {
    let listener = bind(&config.bind_address()).await?;
    let state = Arc::new(AppState::new(hub, config));
    serve(listener, state, shutdown).await
}

/// Build the Axum application with all routes and middleware
fn build_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.server);
    routes::create_router(state).layer(cors)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                logger::warning(
                    LogTag::Webserver,
                    &format!("Ignoring invalid allowed origin '{}'", origin),
                );
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET])
}
