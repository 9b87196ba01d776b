/// Notification Hub - registry and fan-out
///
/// The Hub owns the set of live clients and routes two kinds of updates:
/// - status updates, delivered only to clients subscribed to the environment
/// - operation updates, delivered to every client
///
/// The registry lock is held only to snapshot the client list. Delivery
/// happens afterwards through each client's non-blocking outbox, so a slow
/// client can never stall a broadcast or the registry.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{
    config::HubConfig,
    errors::{DisconnectReason, EnqueueError, HubError},
    logger::{self, LogTag},
};

use super::client::{ClientHandle, ClientId, Frame};
use super::message::Envelope;
use super::metrics::HubMetrics;

// ============================================================================
// HUB LINK
// ============================================================================

/// What a Client Actor may ask of its hub
#[async_trait]
pub trait HubLink: Send + Sync {
    /// Remove a client; no-op when it is not registered
    async fn unregister(&self, id: ClientId);

    /// Deliver a status update to subscribers of the environment
    async fn broadcast_status(&self, environment_id: &str, status: Value) -> usize;

    /// Deliver an operation update to every client
    async fn broadcast_operation(&self, operation_id: &str, update: Value) -> usize;
}

// ============================================================================
// HUB
// ============================================================================

pub struct Hub {
    /// Live clients (client_id → handle)
    clients: RwLock<HashMap<ClientId, Arc<ClientHandle>>>,

    /// Registration refused beyond this many clients
    max_clients: Option<usize>,

    metrics: Arc<HubMetrics>,

    /// Per-client settings handed to new actors
    config: HubConfig,
}

impl Hub {
    pub fn new(config: HubConfig) -> Arc<Self> {
        Self::build(config, None)
    }

    /// Hub that refuses registrations beyond `max_clients`
    pub fn with_limit(config: HubConfig, max_clients: usize) -> Arc<Self> {
        Self::build(config, Some(max_clients))
    }

    fn build(config: HubConfig, max_clients: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            max_clients,
            metrics: HubMetrics::new(),
            config,
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Add a client to the registry
    ///
    /// Registering an id twice is a programming error and is refused.
    pub async fn register(&self, client: Arc<ClientHandle>) -> Result<(), HubError> {
        let id = client.id();
        let active = {
            let mut clients = self.clients.write().await;
            if clients.contains_key(&id) {
                drop(clients);
                logger::error(
                    LogTag::Hub,
                    &format!("Hub: client {} registered twice", id),
                );
                return Err(HubError::DuplicateClient(id));
            }
            if let Some(limit) = self.max_clients {
                if clients.len() >= limit {
                    return Err(HubError::AtCapacity { limit });
                }
            }
            clients.insert(id, client);
            clients.len()
        };
        self.metrics.connection_opened();

        logger::debug(
            LogTag::Hub,
            &format!("Hub: client {} registered (active={})", id, active),
        );
        Ok(())
    }

    /// Remove a client from the registry
    ///
    /// Returns whether the client was registered. The removed client is
    /// marked closed so in-flight broadcasts stop feeding it.
    pub async fn unregister(&self, id: ClientId) -> bool {
        let (removed, active) = {
            let mut clients = self.clients.write().await;
            let removed = clients.remove(&id);
            (removed, clients.len())
        };

        let Some(client) = removed else {
            return false;
        };
        client.shutdown(DisconnectReason::Shutdown);
        self.metrics.connection_closed();

        logger::debug(
            LogTag::Hub,
            &format!("Hub: client {} unregistered (active={})", id, active),
        );
        true
    }

    /// Deliver a status update to every client subscribed to `environment_id`
    ///
    /// The frame is serialized once, and only if at least one client is
    /// subscribed. Returns the number of clients it was queued for.
    pub async fn broadcast_status(&self, environment_id: &str, status: Value) -> usize {
        let targets: Vec<Arc<ClientHandle>> = self
            .snapshot()
            .await
            .into_iter()
            .filter(|client| client.is_subscribed_to(environment_id))
            .collect();

        if targets.is_empty() {
            logger::verbose(
                LogTag::Hub,
                &format!("Hub: no subscribers for {}", environment_id),
            );
            return 0;
        }

        let Some(frame) = self.encode(&Envelope::status_update(environment_id, status)) else {
            return 0;
        };

        let mut sent = 0;
        let mut dropped = 0;
        for client in &targets {
            match client.deliver_if_subscribed(environment_id, &frame) {
                Ok(true) => {
                    sent += 1;
                    self.metrics.message_sent();
                }
                // Unsubscribed since the snapshot
                Ok(false) => {}
                Err(e) => {
                    dropped += 1;
                    self.record_drop(client.id(), e);
                }
            }
        }

        logger::debug(
            LogTag::Hub,
            &format!(
                "Hub: status_update {} (sent={}, dropped={})",
                environment_id, sent, dropped
            ),
        );
        sent
    }

    /// Deliver an operation update to every registered client
    ///
    /// Returns the number of clients it was queued for.
    pub async fn broadcast_operation(&self, operation_id: &str, update: Value) -> usize {
        let targets = self.snapshot().await;
        if targets.is_empty() {
            return 0;
        }

        let Some(frame) = self.encode(&Envelope::operation_update(operation_id, update)) else {
            return 0;
        };

        let mut sent = 0;
        let mut dropped = 0;
        for client in &targets {
            match client.deliver_unconditional(&frame) {
                Ok(()) => {
                    sent += 1;
                    self.metrics.message_sent();
                }
                Err(e) => {
                    dropped += 1;
                    self.record_drop(client.id(), e);
                }
            }
        }

        logger::debug(
            LogTag::Hub,
            &format!(
                "Hub: operation_update {} (sent={}, dropped={})",
                operation_id, sent, dropped
            ),
        );
        sent
    }

    /// Ask one client to close; its actor unregisters it on the way out
    pub async fn disconnect(&self, id: ClientId) -> bool {
        match self.get(id).await {
            Some(client) => client.shutdown(DisconnectReason::Shutdown),
            None => false,
        }
    }

    /// Ask every client to close
    pub async fn shutdown_all(&self) {
        let clients = self.snapshot().await;
        for client in &clients {
            client.shutdown(DisconnectReason::Shutdown);
        }
        logger::info(
            LogTag::Hub,
            &format!("Hub: shutdown requested for {} clients", clients.len()),
        );
    }

    pub async fn get(&self, id: ClientId) -> Option<Arc<ClientHandle>> {
        self.clients.read().await.get(&id).cloned()
    }

    pub async fn client_ids(&self) -> Vec<ClientId> {
        self.clients.read().await.keys().copied().collect()
    }

    pub async fn active_connections(&self) -> usize {
        self.clients.read().await.len()
    }

    pub fn metrics(&self) -> Arc<HubMetrics> {
        self.metrics.clone()
    }

    /// Copy of the registry taken under a short read lock
    async fn snapshot(&self) -> Vec<Arc<ClientHandle>> {
        self.clients.read().await.values().cloned().collect()
    }

    fn encode(&self, envelope: &Envelope) -> Option<Frame> {
        match envelope.encode() {
            Ok(frame) => Some(frame),
            Err(e) => {
                logger::error(
                    LogTag::Hub,
                    &format!("Hub: failed to serialize {}: {}", envelope.kind, e),
                );
                None
            }
        }
    }

    fn record_drop(&self, id: ClientId, error: EnqueueError) {
        self.metrics.message_dropped();
        if let EnqueueError::OutboxFull { .. } = error {
            self.metrics.slow_consumer_disconnected();
        }
        logger::debug(
            LogTag::Hub,
            &format!("Hub: frame dropped for client {} ({})", id, error),
        );
    }
}

#[async_trait]
impl HubLink for Hub {
    async fn unregister(&self, id: ClientId) {
        Hub::unregister(self, id).await;
    }

    async fn broadcast_status(&self, environment_id: &str, status: Value) -> usize {
        Hub::broadcast_status(self, environment_id, status).await
    }

    async fn broadcast_operation(&self, operation_id: &str, update: Value) -> usize {
        Hub::broadcast_operation(self, operation_id, update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webserver::ws::client::ClientChannels;
    use crate::webserver::ws::message::{ClientCommand, ServerMessage, StatusUpdate};
    use serde_json::json;

    async fn connect(hub: &Hub, capacity: usize) -> (Arc<ClientHandle>, ClientChannels) {
        let (handle, channels) = ClientHandle::new(ClientId::new(), capacity);
        hub.register(handle.clone()).await.unwrap();
        (handle, channels)
    }

    fn subscribe(handle: &ClientHandle, environments: &[&str]) {
        let environments = environments.iter().map(|e| e.to_string()).collect();
        handle.apply_command(ClientCommand::Subscribe(environments), false);
    }

    fn drain(channels: &mut ClientChannels) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(frame) = channels.outbox.try_recv() {
            for message in ServerMessage::parse_frame(&frame) {
                messages.push(message.unwrap());
            }
        }
        messages
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let hub = Hub::new(HubConfig::default());
        let (a, _ca) = connect(&hub, 4).await;
        let (b, _cb) = connect(&hub, 4).await;

        assert_eq!(hub.active_connections().await, 2);
        assert_ne!(a.id(), b.id());

        assert!(hub.unregister(a.id()).await);
        assert!(!hub.unregister(a.id()).await);
        assert!(a.is_closed());

        let ids = hub.client_ids().await;
        assert_eq!(ids, vec![b.id()]);
        assert_eq!(hub.metrics().snapshot().active_connections, 1);
        assert_eq!(hub.metrics().snapshot().total_connections, 2);
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_refused() {
        let hub = Hub::new(HubConfig::default());
        let (a, _ca) = connect(&hub, 4).await;

        assert_eq!(
            hub.register(a.clone()).await,
            Err(HubError::DuplicateClient(a.id()))
        );
        assert_eq!(hub.active_connections().await, 1);
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let hub = Hub::with_limit(HubConfig::default(), 1);
        let (_a, _ca) = connect(&hub, 4).await;

        let (b, _cb) = ClientHandle::new(ClientId::new(), 4);
        assert_eq!(
            hub.register(b).await,
            Err(HubError::AtCapacity { limit: 1 })
        );
    }

    #[tokio::test]
    async fn test_unregister_unknown_is_noop() {
        let hub = Hub::new(HubConfig::default());
        assert!(!hub.unregister(ClientId::new()).await);
        assert_eq!(hub.metrics().snapshot().active_connections, 0);
    }

    #[tokio::test]
    async fn test_status_update_reaches_only_subscribers() {
        let hub = Hub::new(HubConfig::default());
        let (a, mut ca) = connect(&hub, 8).await;
        let (b, mut cb) = connect(&hub, 8).await;
        subscribe(&a, &["env-1"]);
        subscribe(&b, &["env-2"]);

        let sent = hub.broadcast_status("env-1", json!({"state": "running"})).await;
        assert_eq!(sent, 1);

        assert_eq!(
            drain(&mut ca),
            vec![ServerMessage::StatusUpdate(StatusUpdate {
                environment_id: "env-1".to_string(),
                status: json!({"state": "running"}),
            })]
        );
        assert!(drain(&mut cb).is_empty());
    }

    #[tokio::test]
    async fn test_status_update_without_subscribers() {
        let hub = Hub::new(HubConfig::default());
        let (_a, mut ca) = connect(&hub, 8).await;

        assert_eq!(hub.broadcast_status("env-9", json!("up")).await, 0);
        assert!(drain(&mut ca).is_empty());
        assert_eq!(hub.metrics().snapshot().total_messages_sent, 0);
    }

    #[tokio::test]
    async fn test_operation_update_reaches_everyone() {
        let hub = Hub::new(HubConfig::default());
        let mut channels = Vec::new();
        for environments in [&["env-1"][..], &["env-2"][..], &[][..]] {
            let (handle, ch) = connect(&hub, 8).await;
            subscribe(&handle, environments);
            channels.push(ch);
        }

        let sent = hub
            .broadcast_operation("op-42", json!({"status": "completed"}))
            .await;
        assert_eq!(sent, 3);

        for ch in channels.iter_mut() {
            match drain(ch).as_slice() {
                [ServerMessage::OperationUpdate(update)] => {
                    assert_eq!(update.operation_id, "op-42");
                    assert_eq!(update.update, json!({"status": "completed"}));
                }
                other => panic!("unexpected frames: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_slow_client_does_not_block_others() {
        let hub = Hub::new(HubConfig::default());
        let (slow, _slow_channels) = connect(&hub, 2).await;
        let (fast, mut fast_channels) = connect(&hub, 16).await;
        subscribe(&slow, &["env-1"]);
        subscribe(&fast, &["env-1"]);

        for i in 0..5 {
            hub.broadcast_status("env-1", json!({ "seq": i })).await;
            // Keep the fast client's queue empty
            assert_eq!(drain(&mut fast_channels).len(), 1);
        }

        assert!(slow.is_closed());
        assert_eq!(slow.disconnect_reason(), Some(DisconnectReason::OutboxFull));
        assert!(!fast.is_closed());

        let metrics = hub.metrics().snapshot();
        assert_eq!(metrics.slow_consumer_disconnects, 1);
        // 2 queued for slow before overflow, 5 for fast
        assert_eq!(metrics.total_messages_sent, 7);
        assert_eq!(metrics.total_messages_dropped, 3);
    }

    #[tokio::test]
    async fn test_disconnect_and_shutdown_all() {
        let hub = Hub::new(HubConfig::default());
        let (a, _ca) = connect(&hub, 4).await;
        let (b, _cb) = connect(&hub, 4).await;

        assert!(hub.disconnect(a.id()).await);
        assert!(a.is_closed());
        assert!(!b.is_closed());
        assert!(!hub.disconnect(ClientId::new()).await);

        hub.shutdown_all().await;
        assert!(b.is_closed());
        assert_eq!(b.disconnect_reason(), Some(DisconnectReason::Shutdown));
    }

    #[tokio::test]
    async fn test_unregistered_client_receives_nothing() {
        let hub = Hub::new(HubConfig::default());
        let (a, mut ca) = connect(&hub, 8).await;
        subscribe(&a, &["env-1"]);

        hub.unregister(a.id()).await;
        assert_eq!(hub.broadcast_status("env-1", json!("up")).await, 0);
        assert_eq!(hub.broadcast_operation("op-1", json!({})).await, 0);
        assert!(drain(&mut ca).is_empty());
    }

    #[tokio::test]
    async fn test_hub_link_delegates() {
        let hub = Hub::new(HubConfig::default());
        let (a, mut ca) = connect(&hub, 8).await;
        let link: Arc<dyn HubLink> = hub.clone();

        assert_eq!(link.broadcast_operation("op-1", json!({})).await, 1);
        assert_eq!(drain(&mut ca).len(), 1);

        link.unregister(a.id()).await;
        assert_eq!(hub.active_connections().await, 0);
    }
}
