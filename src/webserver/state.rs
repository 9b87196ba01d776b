/// Shared application state for the webserver
///
/// Route handlers reach the hub and the listener settings through this state;
/// nothing here is global.
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::webserver::ws::Hub;

/// Shared application state passed to all route handlers
#[derive(Clone)]
pub struct AppState {
    /// Notification hub every upgraded connection registers with
    pub hub: Arc<Hub>,

    /// Listener and upgrade settings
    pub server: Arc<ServerConfig>,

    /// Server startup time
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>, server: ServerConfig) -> Self {
        Self {
            hub,
            server: Arc::new(server),
            startup_time: chrono::Utc::now(),
        }
    }

    /// Whether an upgrade carrying this `Origin` header may proceed
    ///
    /// An empty allow-list admits every origin, including requests without one.
    pub fn is_origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.server.allowed_origins.is_empty() {
            return true;
        }
        match origin {
            Some(origin) => self
                .server
                .allowed_origins
                .iter()
                .any(|allowed| allowed.trim_end_matches('/') == origin.trim_end_matches('/')),
            None => false,
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        (chrono::Utc::now() - self.startup_time)
            .num_seconds()
            .max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;

    fn state_with_origins(origins: &[&str]) -> AppState {
        let server = ServerConfig {
            allowed_origins: origins.iter().map(|o| o.to_string()).collect(),
            ..ServerConfig::default()
        };
        AppState::new(Hub::new(HubConfig::default()), server)
    }

    #[test]
    fn test_empty_allow_list_admits_everyone() {
        let state = state_with_origins(&[]);
        assert!(state.is_origin_allowed(None));
        assert!(state.is_origin_allowed(Some("http://evil.example")));
    }

    #[test]
    fn test_allow_list_matches_exact_origins() {
        let state = state_with_origins(&["http://localhost:3000/"]);
        assert!(state.is_origin_allowed(Some("http://localhost:3000")));
        assert!(!state.is_origin_allowed(Some("http://localhost:3001")));
        assert!(!state.is_origin_allowed(None));
    }

    #[test]
    fn test_uptime_starts_at_zero() {
        let state = state_with_origins(&[]);
        assert!(state.uptime_seconds() <= 1);
    }
}
