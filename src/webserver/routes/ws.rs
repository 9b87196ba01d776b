/// WebSocket upgrade endpoint
///
/// Every accepted upgrade gets a fresh client id, registers with the hub and
/// hands the socket to its Client Actor for the rest of its life.
use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::{
    errors::HubError,
    logger::{self, LogTag},
    webserver::{
        state::AppState,
        ws::{ClientActor, ClientId},
    },
};

/// Close code sent when the hub refuses a registration (try again later)
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

pub fn routes(ws_path: &str) -> Router<Arc<AppState>> {
    Router::new().route(ws_path, get(ws_hub_handler))
}

/// Upgrade handler
///
/// Refuses disallowed origins with 403 and upgrades beyond the connection
/// cap with 503.
pub async fn ws_hub_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());

    if !state.is_origin_allowed(origin) {
        logger::warning(
            LogTag::Webserver,
            &format!("Rejected upgrade from origin {:?}", origin),
        );
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }

    let active = state.hub.active_connections().await;
    if active >= state.server.max_connections {
        logger::warning(
            LogTag::Webserver,
            &format!(
                "Rejected upgrade: {} active connections (max {})",
                active, state.server.max_connections
            ),
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    }

    let max_message_size = state.hub.config().max_message_size;
    ws.max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let hub = state.hub.clone();
    let actor = ClientActor::new(ClientId::new(), hub.clone(), hub.config());
    let id = actor.handle().id();

    if let Err(e) = hub.register(actor.handle()).await {
        logger::warning(
            LogTag::Webserver,
            &format!("Closing connection {}: {}", id, e),
        );
        let reason = match e {
            HubError::AtCapacity { .. } => "hub at capacity",
            HubError::DuplicateClient(_) => "registration failed",
        };
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_TRY_AGAIN_LATER,
                reason: reason.into(),
            })))
            .await;
        return;
    }

    let reason = actor.run(socket).await;
    logger::debug(
        LogTag::Webserver,
        &format!("Connection {} finished: {}", id, reason),
    );
}
