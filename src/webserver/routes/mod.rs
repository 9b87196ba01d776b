use axum::Router;
use std::sync::Arc;

use crate::webserver::state::AppState;

pub mod ws;

pub fn create_router(state: Arc<AppState>) -> Router {
    let ws_path = state.server.ws_path.clone();
    Router::new().merge(ws::routes(&ws_path)).with_state(state)
}
