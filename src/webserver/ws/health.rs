/// WebSocket health monitoring
///
/// Liveness contract: the peer must produce some frame (normally the pong to
/// our heartbeat ping) at least once per liveness window, otherwise the
/// connection is closed. Heartbeats go out at a period below the window.
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::config::HubConfig;

// ============================================================================
// HEALTH CONFIG
// ============================================================================

/// Health monitoring configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    /// Heartbeat interval (server sends ping)
    pub ping_period: Duration,

    /// Liveness window (maximum silence from the peer)
    pub pong_wait: Duration,

    /// Deadline for a single write
    pub write_wait: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self::from_config(&HubConfig::default())
    }
}

impl HealthConfig {
    pub fn from_config(cfg: &HubConfig) -> Self {
        Self {
            ping_period: cfg.ping_period(),
            pong_wait: cfg.pong_wait(),
            write_wait: cfg.write_wait(),
        }
    }
}

// ============================================================================
// LIVENESS DEADLINE
// ============================================================================

/// Rolling read deadline, pushed forward by every inbound frame
#[derive(Debug)]
pub struct LivenessDeadline {
    window: Duration,
    last_activity: Instant,
}

impl LivenessDeadline {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_activity: Instant::now(),
        }
    }

    /// Record peer activity (any frame, including pong)
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Instant after which the peer is considered dead
    pub fn deadline(&self) -> Instant {
        self.last_activity + self.window
    }

    pub fn millis_since_activity(&self) -> u128 {
        self.last_activity.elapsed().as_millis()
    }
}

/// Create a heartbeat ticker whose first tick is one period from now
pub fn heartbeat_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
