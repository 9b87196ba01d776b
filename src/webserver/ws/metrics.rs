use serde::Serialize;
/// WebSocket metrics collection
///
/// Per-connection and hub-level counters for monitoring and debugging.
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// CONNECTION METRICS
// ============================================================================

/// Per-connection metrics (thread-safe)
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    /// Frames written to the peer (coalesced frames count individually)
    messages_sent: AtomicU64,

    /// Frames refused by a full or closed outbox
    messages_dropped: AtomicU64,

    /// Frames read from the peer
    frames_received: AtomicU64,

    /// Inbound frames dropped as malformed or unknown
    malformed_frames: AtomicU64,

    /// Highest observed outbox depth
    queue_peak: AtomicUsize,
}

impl ConnectionMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_sent(&self, count: u64) {
        self.messages_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Record outbox depth, keeping the peak
    pub fn observe_queue_depth(&self, depth: usize) {
        self.queue_peak.fetch_max(depth, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConnectionMetricsSnapshot {
        ConnectionMetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            queue_peak: self.queue_peak.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot (serializable)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionMetricsSnapshot {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub frames_received: u64,
    pub malformed_frames: u64,
    pub queue_peak: usize,
}

// ============================================================================
// HUB METRICS
// ============================================================================

/// Hub-level metrics (aggregate across all connections)
#[derive(Debug, Default)]
pub struct HubMetrics {
    /// Total connections (lifetime)
    total_connections: AtomicU64,

    /// Current active connections
    active_connections: AtomicUsize,

    /// Frames accepted by client outboxes
    total_messages_sent: AtomicU64,

    /// Frames refused by client outboxes
    total_messages_dropped: AtomicU64,

    /// Clients torn down because their outbox overflowed
    slow_consumer_disconnects: AtomicU64,
}

impl HubMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.total_messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.total_messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn slow_consumer_disconnected(&self) {
        self.slow_consumer_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HubMetricsSnapshot {
        HubMetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_messages_sent: self.total_messages_sent.load(Ordering::Relaxed),
            total_messages_dropped: self.total_messages_dropped.load(Ordering::Relaxed),
            slow_consumer_disconnects: self.slow_consumer_disconnects.load(Ordering::Relaxed),
        }
    }
}

/// Hub metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubMetricsSnapshot {
    pub total_connections: u64,
    pub active_connections: usize,
    pub total_messages_sent: u64,
    pub total_messages_dropped: u64,
    pub slow_consumer_disconnects: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_metrics() {
        let metrics = ConnectionMetrics::new();

        metrics.inc_sent(1);
        metrics.inc_sent(3);
        metrics.inc_dropped();
        metrics.inc_received();
        metrics.inc_malformed();
        metrics.observe_queue_depth(10);
        metrics.observe_queue_depth(20);
        metrics.observe_queue_depth(15);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_sent, 4);
        assert_eq!(snapshot.messages_dropped, 1);
        assert_eq!(snapshot.frames_received, 1);
        assert_eq!(snapshot.malformed_frames, 1);
        assert_eq!(snapshot.queue_peak, 20);
    }

    #[test]
    fn test_hub_metrics() {
        let metrics = HubMetrics::new();

        metrics.connection_opened();
        metrics.connection_opened();
        metrics.message_sent();
        metrics.message_sent();
        metrics.message_dropped();
        metrics.slow_consumer_disconnected();
        metrics.connection_closed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_connections, 2);
        assert_eq!(snapshot.active_connections, 1);
        assert_eq!(snapshot.total_messages_sent, 2);
        assert_eq!(snapshot.total_messages_dropped, 1);
        assert_eq!(snapshot.slow_consumer_disconnects, 1);
    }
}
