/// Configuration schemas - all config structures defined once with defaults
use std::time::Duration;

use crate::config_struct;

// ============================================================================
// SERVER CONFIGURATION
// ============================================================================

config_struct! {
    /// HTTP listener and upgrade endpoint
    pub struct ServerConfig {
        /// Host/IP address to bind
        host: String = "127.0.0.1".to_string(),

        /// Port to bind
        port: u16 = 8080,

        /// Path of the upgrade endpoint
        ws_path: String = "/ws".to_string(),

        /// Upgrades beyond this many active clients are refused
        max_connections: usize = 1000,

        /// Origins allowed to upgrade (empty = any origin)
        allowed_origins: Vec<String> = Vec::new(),
    }
}

// ============================================================================
// HUB CONFIGURATION
// ============================================================================

config_struct! {
    /// Per-connection timing and queueing
    pub struct HubConfig {
        /// Time allowed to write one frame to the peer
        write_wait_ms: u64 = 10_000,

        /// Liveness window: maximum silence from the peer
        pong_wait_ms: u64 = 60_000,

        /// Heartbeat period, must be below pong_wait_ms
        ping_period_ms: u64 = 54_000,

        /// Maximum inbound frame size in bytes
        max_message_size: usize = 512 * 1024,

        /// Outbox capacity in frames
        outbox_capacity: usize = 256,

        /// Join frames already queued at write time into one newline-delimited frame
        coalesce_frames: bool = false,

        /// Confirm subscribe/unsubscribe with subscribed/unsubscribed frames
        acknowledge_subscriptions: bool = true,
    }
}

// ============================================================================
// CONNECTOR CONFIGURATION
// ============================================================================

config_struct! {
    /// Exponential reconnect backoff (disabled = fixed delay forever)
    pub struct BackoffConfig {
        enabled: bool = false,
        max_delay_ms: u64 = 60_000,
        multiplier: f64 = 2.0,
        /// Fraction of the delay randomized in both directions (0.0 - 1.0)
        jitter: f64 = 0.2,
        /// Give up after this many failed attempts (0 = never)
        max_attempts: u32 = 0,
    }
}

config_struct! {
    /// Peer-side reconnecting connector
    pub struct ConnectorConfig {
        url: String = "ws://127.0.0.1:8080/ws".to_string(),
        reconnect_delay_ms: u64 = 5_000,
        ping_interval_ms: u64 = 30_000,
        backoff: BackoffConfig = BackoffConfig::default(),
    }
}

// ============================================================================
// DEMO SOURCE CONFIGURATION
// ============================================================================

config_struct! {
    /// Synthetic update source enabled with --demo
    pub struct DemoConfig {
        interval_ms: u64 = 2_000,
        environments: Vec<String> = vec![
            "env-1".to_string(),
            "env-2".to_string(),
            "env-3".to_string(),
        ],
    }
}

// ============================================================================
// ROOT CONFIGURATION
// ============================================================================

config_struct! {
    /// Root configuration structure containing all sub-configurations
    pub struct Config {
        server: ServerConfig = ServerConfig::default(),
        hub: HubConfig = HubConfig::default(),
        connector: ConnectorConfig = ConnectorConfig::default(),
        demo: DemoConfig = DemoConfig::default(),
    }
}

// ============================================================================
// IMPLEMENTATIONS
// ============================================================================

impl ServerConfig {
    /// Get the full bind address (host:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Host cannot be empty".to_string());
        }
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if !self.ws_path.starts_with('/') {
            return Err(format!("ws_path must start with '/': {}", self.ws_path));
        }
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }
        Ok(())
    }
}

impl HubConfig {
    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_millis(self.ping_period_ms)
    }

    /// Derive the heartbeat period as 9/10 of the liveness window
    pub fn with_liveness_window(mut self, pong_wait: Duration) -> Self {
        self.pong_wait_ms = pong_wait.as_millis() as u64;
        self.ping_period_ms = self.pong_wait_ms * 9 / 10;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.write_wait_ms == 0 {
            return Err("write_wait_ms must be > 0".to_string());
        }
        if self.ping_period_ms == 0 {
            return Err("ping_period_ms must be > 0".to_string());
        }
        if self.ping_period_ms >= self.pong_wait_ms {
            return Err(format!(
                "ping_period_ms ({}) must be less than pong_wait_ms ({})",
                self.ping_period_ms, self.pong_wait_ms
            ));
        }
        if self.max_message_size == 0 {
            return Err("max_message_size must be > 0".to_string());
        }
        if self.outbox_capacity == 0 {
            return Err("outbox_capacity must be > 0".to_string());
        }
        Ok(())
    }
}

impl ConnectorConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Connector url cannot be empty".to_string());
        }
        if self.reconnect_delay_ms == 0 {
            return Err("reconnect_delay_ms must be > 0".to_string());
        }
        if self.ping_interval_ms == 0 {
            return Err("ping_interval_ms must be > 0".to_string());
        }
        if self.backoff.enabled {
            if self.backoff.multiplier < 1.0 {
                return Err("backoff.multiplier must be >= 1.0".to_string());
            }
            if !(0.0..=1.0).contains(&self.backoff.jitter) {
                return Err("backoff.jitter must be within 0.0 - 1.0".to_string());
            }
            if self.backoff.max_delay_ms < self.reconnect_delay_ms {
                return Err("backoff.max_delay_ms must be >= reconnect_delay_ms".to_string());
            }
        }
        Ok(())
    }
}

impl Config {
    /// Validate every section
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.hub.validate()?;
        self.connector.validate()?;
        if self.demo.interval_ms == 0 {
            return Err("demo.interval_ms must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.hub.write_wait(), Duration::from_secs(10));
        assert_eq!(cfg.hub.pong_wait(), Duration::from_secs(60));
        assert_eq!(cfg.hub.ping_period(), Duration::from_secs(54));
        assert_eq!(cfg.hub.max_message_size, 512 * 1024);
        assert_eq!(cfg.hub.outbox_capacity, 256);
        assert_eq!(cfg.connector.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(cfg.connector.ping_interval(), Duration::from_secs(30));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [server]
            port = 9001

            [hub]
            outbox_capacity = 16
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.port, 9001);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.hub.outbox_capacity, 16);
        assert_eq!(cfg.hub.pong_wait_ms, 60_000);
    }

    #[test]
    fn test_heartbeat_must_be_below_liveness_window() {
        let mut hub = HubConfig::default();
        hub.ping_period_ms = hub.pong_wait_ms;
        assert!(hub.validate().is_err());

        let hub = HubConfig::default().with_liveness_window(Duration::from_millis(200));
        assert_eq!(hub.ping_period_ms, 180);
        assert!(hub.validate().is_ok());
    }

    #[test]
    fn test_backoff_validation() {
        let mut connector = ConnectorConfig::default();
        connector.backoff.enabled = true;
        connector.backoff.jitter = 1.5;
        assert!(connector.validate().is_err());

        connector.backoff.jitter = 0.1;
        connector.backoff.multiplier = 0.5;
        assert!(connector.validate().is_err());
    }
}
