/// Client Actor - one per WebSocket connection
///
/// The actor owns the socket and runs two loops coupled only through the
/// outbox:
/// - read loop: decodes control frames, mutates this client's subscription
///   state, enforces the liveness window
/// - write loop: drains the outbox, sends heartbeat pings, enforces the write
///   deadline
///
/// Everything else in the process sees the client through [`ClientHandle`],
/// which can only enqueue frames or request shutdown.
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, timeout};
use uuid::Uuid;

use crate::{
    config::HubConfig,
    errors::{DisconnectReason, EnqueueError},
    logger::{self, LogTag},
};

use super::{
    health::{heartbeat_ticker, HealthConfig, LivenessDeadline},
    hub::HubLink,
    message::{ClientCommand, Envelope},
    metrics::{ConnectionMetrics, ConnectionMetricsSnapshot},
};

// ============================================================================
// CLIENT TYPES
// ============================================================================

/// Opaque connection identifier, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serialized outbound frame, shared between all recipients of a broadcast
pub type Frame = Arc<str>;

/// Receiving ends owned by the actor's loops
pub struct ClientChannels {
    pub outbox: mpsc::Receiver<Frame>,
    pub shutdown: watch::Receiver<Option<DisconnectReason>>,
}

// ============================================================================
// CLIENT HANDLE
// ============================================================================

/// Hub-facing side of a client
pub struct ClientHandle {
    id: ClientId,

    /// Environment ids this client wants status updates for
    subscriptions: RwLock<HashSet<String>>,

    authenticated: AtomicBool,

    /// Producer side of the bounded outbox
    outbox: mpsc::Sender<Frame>,
    capacity: usize,

    /// Set once; every enqueue checks it first
    closed: AtomicBool,

    /// Carries the first shutdown reason to both loops
    shutdown_tx: watch::Sender<Option<DisconnectReason>>,

    /// Guards the single hub unregistration
    unregistered: AtomicBool,

    metrics: Arc<ConnectionMetrics>,
}

impl ClientHandle {
    /// Create a handle and the channel ends its actor will consume
    pub fn new(id: ClientId, capacity: usize) -> (Arc<Self>, ClientChannels) {
        let (outbox_tx, outbox_rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(None);

        let handle = Arc::new(Self {
            id,
            subscriptions: RwLock::new(HashSet::new()),
            authenticated: AtomicBool::new(false),
            outbox: outbox_tx,
            capacity,
            closed: AtomicBool::new(false),
            shutdown_tx,
            unregistered: AtomicBool::new(false),
            metrics: ConnectionMetrics::new(),
        });

        let channels = ClientChannels {
            outbox: outbox_rx,
            shutdown: shutdown_rx,
        };

        (handle, channels)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn is_subscribed_to(&self, environment_id: &str) -> bool {
        self.subscriptions.read().contains(environment_id)
    }

    /// Sorted copy of the subscription set
    pub fn subscriptions(&self) -> Vec<String> {
        let mut list: Vec<String> = self.subscriptions.read().iter().cloned().collect();
        list.sort();
        list
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> ConnectionMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Reason recorded by the first shutdown request
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.shutdown_tx.borrow().clone()
    }

    /// Non-blocking enqueue onto the outbox
    ///
    /// A full outbox marks the client dead and starts teardown instead of
    /// waiting for the peer.
    pub fn try_enqueue(&self, frame: Frame) -> Result<(), EnqueueError> {
        if self.is_closed() {
            self.metrics.inc_dropped();
            return Err(EnqueueError::Closed);
        }

        match self.outbox.try_send(frame) {
            Ok(()) => {
                self.metrics
                    .observe_queue_depth(self.capacity - self.outbox.capacity());
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.inc_dropped();
                logger::warning(
                    LogTag::Client,
                    &format!(
                        "Client {}: outbox full ({} frames), disconnecting slow consumer",
                        self.id, self.capacity
                    ),
                );
                self.shutdown(DisconnectReason::OutboxFull);
                Err(EnqueueError::OutboxFull {
                    capacity: self.capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.inc_dropped();
                self.shutdown(DisconnectReason::Transport(
                    "outbox consumer gone".to_string(),
                ));
                Err(EnqueueError::Closed)
            }
        }
    }

    /// Enqueue a status frame if this client subscribes to the environment
    ///
    /// Returns `Ok(false)` when the client is not subscribed.
    pub fn deliver_if_subscribed(
        &self,
        environment_id: &str,
        frame: &Frame,
    ) -> Result<bool, EnqueueError> {
        if !self.is_subscribed_to(environment_id) {
            return Ok(false);
        }
        self.try_enqueue(frame.clone()).map(|_| true)
    }

    /// Enqueue a frame regardless of subscriptions
    pub fn deliver_unconditional(&self, frame: &Frame) -> Result<(), EnqueueError> {
        self.try_enqueue(frame.clone())
    }

    /// Request teardown of both loops
    ///
    /// Idempotent: only the first call records its reason. Returns whether
    /// this call initiated the shutdown.
    pub fn shutdown(&self, reason: DisconnectReason) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown_tx.send_replace(Some(reason));
        true
    }

    /// Apply one decoded control message from the peer
    pub(crate) fn apply_command(&self, command: ClientCommand, acknowledge: bool) {
        match command {
            ClientCommand::Ping => {
                self.enqueue_envelope(&Envelope::pong());
            }
            ClientCommand::Subscribe(environments) => {
                {
                    let mut subscriptions = self.subscriptions.write();
                    for environment_id in &environments {
                        subscriptions.insert(environment_id.clone());
                    }
                }
                logger::debug(
                    LogTag::Client,
                    &format!("Client {}: subscribed to {:?}", self.id, environments),
                );
                if acknowledge {
                    self.enqueue_envelope(&Envelope::subscribed(environments));
                }
            }
            ClientCommand::Unsubscribe(environments) => {
                {
                    let mut subscriptions = self.subscriptions.write();
                    for environment_id in &environments {
                        subscriptions.remove(environment_id);
                    }
                }
                logger::debug(
                    LogTag::Client,
                    &format!("Client {}: unsubscribed from {:?}", self.id, environments),
                );
                if acknowledge {
                    self.enqueue_envelope(&Envelope::unsubscribed(environments));
                }
            }
            ClientCommand::Authenticate(_) => {
                self.authenticated.store(true, Ordering::Release);
                logger::debug(LogTag::Client, &format!("Client {}: authenticated", self.id));
            }
        }
    }

    /// Decode and apply one inbound text frame
    ///
    /// Malformed frames and unknown types are logged and dropped.
    pub(crate) fn handle_text(&self, text: &str, acknowledge: bool) {
        match ClientCommand::parse(text) {
            Ok(command) => self.apply_command(command, acknowledge),
            Err(e) => {
                self.metrics.inc_malformed();
                logger::warning(
                    LogTag::Client,
                    &format!("Client {}: dropping frame: {}", self.id, e),
                );
            }
        }
    }

    fn enqueue_envelope(&self, envelope: &Envelope) {
        match envelope.encode() {
            Ok(frame) => {
                // Failures are already logged and handled by try_enqueue
                let _ = self.try_enqueue(frame);
            }
            Err(e) => logger::error(
                LogTag::Client,
                &format!("Client {}: failed to serialize {}: {}", self.id, envelope.kind, e),
            ),
        }
    }

    /// Claim the right to unregister; true exactly once
    fn claim_unregister(&self) -> bool {
        !self.unregistered.swap(true, Ordering::AcqRel)
    }
}

// ============================================================================
// CLIENT ACTOR
// ============================================================================

/// Owns one connection for its whole lifetime
pub struct ClientActor {
    handle: Arc<ClientHandle>,
    channels: ClientChannels,
    hub: Arc<dyn HubLink>,
    health: HealthConfig,
    coalesce_frames: bool,
    acknowledge_subscriptions: bool,
}

impl ClientActor {
    pub fn new(id: ClientId, hub: Arc<dyn HubLink>, config: &HubConfig) -> Self {
        let (handle, channels) = ClientHandle::new(id, config.outbox_capacity);
        Self {
            handle,
            channels,
            hub,
            health: HealthConfig::from_config(config),
            coalesce_frames: config.coalesce_frames,
            acknowledge_subscriptions: config.acknowledge_subscriptions,
        }
    }

    pub fn handle(&self) -> Arc<ClientHandle> {
        self.handle.clone()
    }

    /// Run both loops until the connection ends, then tear down once
    pub async fn run(self, socket: WebSocket) -> DisconnectReason {
        let ClientActor {
            handle,
            channels,
            hub,
            health,
            coalesce_frames,
            acknowledge_subscriptions,
        } = self;
        let ClientChannels { outbox, shutdown } = channels;

        let (sink, stream) = socket.split();

        logger::debug(LogTag::Client, &format!("Client {}: started", handle.id()));

        let writer = tokio::spawn(write_loop(
            handle.clone(),
            sink,
            outbox,
            shutdown.clone(),
            health,
            coalesce_frames,
        ));

        let reader = read_loop(
            handle.clone(),
            stream,
            shutdown,
            health,
            acknowledge_subscriptions,
        );
        tokio::pin!(reader);
        tokio::pin!(writer);

        // Whichever loop exits first shuts the other one down
        tokio::select! {
            read_reason = &mut reader => {
                handle.shutdown(read_reason);
                let write_reason = writer_exit(writer.await);
                handle.shutdown(write_reason);
            }
            joined = &mut writer => {
                handle.shutdown(writer_exit(joined));
                reader.await;
            }
        }

        let reason = handle
            .disconnect_reason()
            .unwrap_or(DisconnectReason::Shutdown);

        teardown(&handle, hub.as_ref(), &reason).await;
        reason
    }
}

fn writer_exit(joined: Result<DisconnectReason, tokio::task::JoinError>) -> DisconnectReason {
    match joined {
        Ok(reason) => reason,
        Err(e) => DisconnectReason::Transport(format!("write loop aborted: {}", e)),
    }
}

/// Unregister from the hub, at most once per client
async fn teardown(handle: &ClientHandle, hub: &dyn HubLink, reason: &DisconnectReason) {
    if !handle.claim_unregister() {
        return;
    }

    hub.unregister(handle.id()).await;

    let snapshot = handle.metrics();
    let message = format!(
        "Client {} closed: {} (sent={}, dropped={}, received={}, malformed={}, queue_peak={})",
        handle.id(),
        reason,
        snapshot.messages_sent,
        snapshot.messages_dropped,
        snapshot.frames_received,
        snapshot.malformed_frames,
        snapshot.queue_peak
    );
    if reason.is_peer_fault() {
        logger::warning(LogTag::Client, &message);
    } else {
        logger::debug(LogTag::Client, &message);
    }
}

// ============================================================================
// READ LOOP
// ============================================================================

async fn read_loop(
    handle: Arc<ClientHandle>,
    mut stream: SplitStream<WebSocket>,
    mut shutdown: watch::Receiver<Option<DisconnectReason>>,
    health: HealthConfig,
    acknowledge: bool,
) -> DisconnectReason {
    let mut liveness = LivenessDeadline::new(health.pong_wait);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                return handle.disconnect_reason().unwrap_or(DisconnectReason::Shutdown);
            }

            _ = sleep_until(liveness.deadline()) => {
                logger::warning(
                    LogTag::Client,
                    &format!(
                        "Client {}: no frame for {}ms, closing",
                        handle.id(),
                        liveness.millis_since_activity()
                    ),
                );
                return DisconnectReason::LivenessTimeout;
            }

            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => return DisconnectReason::Transport(e.to_string()),
                    None => return DisconnectReason::PeerClosed,
                };

                liveness.record_activity();
                handle.metrics.inc_received();

                match msg {
                    Message::Text(text) => handle.handle_text(&text, acknowledge),
                    Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                        Ok(text) => handle.handle_text(text, acknowledge),
                        Err(_) => {
                            handle.metrics.inc_malformed();
                            logger::warning(
                                LogTag::Client,
                                &format!("Client {}: dropping non UTF-8 binary frame", handle.id()),
                            );
                        }
                    },
                    // Pings are answered by the socket layer; pongs only refresh liveness
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(_) => return DisconnectReason::PeerClosed,
                }
            }
        }
    }
}

// ============================================================================
// WRITE LOOP
// ============================================================================

/// Drain the outbox until the connection ends
///
/// The exit reason is recorded on the handle before returning so the read
/// loop stops as soon as writes become impossible.
async fn write_loop(
    handle: Arc<ClientHandle>,
    sink: SplitSink<WebSocket, Message>,
    outbox: mpsc::Receiver<Frame>,
    shutdown: watch::Receiver<Option<DisconnectReason>>,
    health: HealthConfig,
    coalesce: bool,
) -> DisconnectReason {
    let reason = write_frames(&handle, sink, outbox, shutdown, health, coalesce).await;
    if handle.shutdown(reason.clone()) {
        logger::debug(
            LogTag::Client,
            &format!("Client {}: write loop ended: {}", handle.id(), reason),
        );
    }
    reason
}

async fn write_frames(
    handle: &ClientHandle,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbox: mpsc::Receiver<Frame>,
    mut shutdown: watch::Receiver<Option<DisconnectReason>>,
    health: HealthConfig,
    coalesce: bool,
) -> DisconnectReason {
    let mut heartbeat = heartbeat_ticker(health.ping_period);

    loop {
        tokio::select! {
            biased;

            // Pending frames are skipped once shutdown is requested
            _ = shutdown.changed() => {
                send_close(&mut sink, &health).await;
                return handle.disconnect_reason().unwrap_or(DisconnectReason::Shutdown);
            }

            frame = outbox.recv() => {
                let Some(frame) = frame else {
                    send_close(&mut sink, &health).await;
                    return DisconnectReason::Shutdown;
                };

                let (text, count) = if coalesce {
                    coalesce_queued(frame, &mut outbox)
                } else {
                    (frame.to_string(), 1)
                };

                match timeout(health.write_wait, sink.send(Message::Text(text))).await {
                    Ok(Ok(())) => handle.metrics.inc_sent(count),
                    Ok(Err(e)) => {
                        logger::warning(
                            LogTag::Client,
                            &format!("Client {}: write failed: {}", handle.id(), e),
                        );
                        return DisconnectReason::Transport(e.to_string());
                    }
                    Err(_) => return DisconnectReason::WriteTimeout,
                }
            }

            _ = heartbeat.tick() => {
                match timeout(health.write_wait, sink.send(Message::Ping(Vec::new()))).await {
                    Ok(Ok(())) => {
                        logger::verbose(LogTag::Client, &format!("Client {}: ping", handle.id()));
                    }
                    Ok(Err(e)) => return DisconnectReason::Transport(e.to_string()),
                    Err(_) => return DisconnectReason::WriteTimeout,
                }
            }
        }
    }
}

/// Join the given frame with every frame already queued, newline-delimited
fn coalesce_queued(first: Frame, outbox: &mut mpsc::Receiver<Frame>) -> (String, u64) {
    let mut text = String::from(&*first);
    let mut count = 1;
    while let Ok(next) = outbox.try_recv() {
        text.push('\n');
        text.push_str(&next);
        count += 1;
    }
    (text, count)
}

async fn send_close(sink: &mut SplitSink<WebSocket, Message>, health: &HealthConfig) {
    // The peer may already be gone; nothing left to do on failure
    let _ = timeout(health.write_wait, sink.send(Message::Close(None))).await;
}
