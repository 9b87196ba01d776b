/// Reconnecting Connector - the peer side of the notification protocol
///
/// Keeps one connection to a hub open for as long as its owner wants it:
/// - replays the remembered `authenticate` payload and the desired
///   subscription set after every successful connect
/// - sends its own `ping` on a fixed interval while connected
/// - reconnects after any drop according to its [`ReconnectPolicy`]
///
/// Subscription changes made while not connected are buffered in the
/// desired set and only reach the server on the next connect.
///
/// The owner drives the connector through a [`ConnectorHandle`] and observes
/// it through a stream of [`ConnectorEvent`]s.
pub mod policy;
pub mod state;

use std::collections::BTreeSet;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::{
    config::ConnectorConfig,
    errors::ConnectorError,
    logger::{self, LogTag},
    webserver::ws::{
        health::heartbeat_ticker,
        message::{Envelope, ServerMessage},
    },
};

pub use policy::ReconnectPolicy;
pub use state::{ConnectionState, ConnectorEvent};

use state::Command;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a single write; shorter ping intervals shorten it further
const MAX_WRITE_WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// HANDLE
// ============================================================================

/// Owner-side control of a running connector
pub struct ConnectorHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl ConnectorHandle {
    /// Add environments to the desired set
    pub fn subscribe(&self, environments: Vec<String>) {
        self.send(Command::Subscribe(environments));
    }

    /// Remove environments from the desired set
    pub fn unsubscribe(&self, environments: Vec<String>) {
        self.send(Command::Unsubscribe(environments));
    }

    /// Send `authenticate` now (if connected) and after every reconnect
    pub fn authenticate(&self, payload: Value) {
        self.send(Command::Authenticate(payload));
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the connector reaches `target` or stops
    pub async fn wait_for_state(&self, target: ConnectionState) -> bool {
        let mut state = self.state.clone();
        loop {
            if *state.borrow_and_update() == target {
                return true;
            }
            if state.changed().await.is_err() {
                return false;
            }
        }
    }

    /// Close the connection and stop reconnecting
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the connector task to end
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            logger::error(LogTag::Connector, &format!("Connector task failed: {}", e));
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            logger::debug(LogTag::Connector, "Connector already stopped, command ignored");
        }
    }
}

// ============================================================================
// CONNECTOR
// ============================================================================

/// How a connected session ended
enum SessionEnd {
    Shutdown,
    Dropped(String),
}

pub struct Connector {
    url: String,
    policy: ReconnectPolicy,
    ping_interval: Duration,

    /// Environments the owner wants, replayed after every connect
    desired: BTreeSet<String>,

    /// Remembered authenticate payload, replayed before the subscriptions
    auth: Option<Value>,

    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ConnectorEvent>,
    state: watch::Sender<ConnectionState>,
}

impl Connector {
    /// Start a connector from configuration
    pub fn spawn(
        config: &ConnectorConfig,
    ) -> Result<(ConnectorHandle, mpsc::UnboundedReceiver<ConnectorEvent>), ConnectorError> {
        Self::spawn_with(
            &config.url,
            ReconnectPolicy::from_config(config),
            config.ping_interval(),
        )
    }

    /// Start a connector with an explicit policy and ping interval
    pub fn spawn_with(
        url: &str,
        policy: ReconnectPolicy,
        ping_interval: Duration,
    ) -> Result<(ConnectorHandle, mpsc::UnboundedReceiver<ConnectorEvent>), ConnectorError> {
        let (connector, commands, events, state) = Self::new(url, policy, ping_interval)?;
        let task = tokio::spawn(connector.run());
        let handle = ConnectorHandle {
            commands,
            state,
            task,
        };
        Ok((handle, events))
    }

    #[allow(clippy::type_complexity)]
    fn new(
        url: &str,
        policy: ReconnectPolicy,
        ping_interval: Duration,
    ) -> Result<
        (
            Self,
            mpsc::UnboundedSender<Command>,
            mpsc::UnboundedReceiver<ConnectorEvent>,
            watch::Receiver<ConnectionState>,
        ),
        ConnectorError,
    > {
        validate_url(url)?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let connector = Self {
            url: url.to_string(),
            policy,
            ping_interval,
            desired: BTreeSet::new(),
            auth: None,
            commands: command_rx,
            events: event_tx,
            state: state_tx,
        };

        Ok((connector, command_tx, event_rx, state_rx))
    }

    async fn run(mut self) {
        let mut failures: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);

            match self.connect().await {
                Ok(Some(stream)) => {
                    failures = 0;
                    self.set_state(ConnectionState::Connected);
                    match self.session(stream).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Dropped(reason) => logger::warning(
                            LogTag::Connector,
                            &format!("Connection to {} lost: {}", self.url, reason),
                        ),
                    }
                }
                // Shutdown requested while connecting
                Ok(None) => break,
                Err(e) => {
                    failures = failures.saturating_add(1);
                    logger::warning(
                        LogTag::Connector,
                        &format!("Connect attempt {} to {} failed: {}", failures, self.url, e),
                    );
                }
            }

            self.set_state(ConnectionState::Disconnected);

            let Some(delay) = self.policy.next_delay(failures) else {
                let error = ConnectorError::RetriesExhausted { attempts: failures };
                logger::error(LogTag::Connector, &error.to_string());
                self.emit(ConnectorEvent::GaveUp { attempts: failures });
                return;
            };

            logger::info(
                LogTag::Connector,
                &format!("Reconnecting to {} in {}ms", self.url, delay.as_millis()),
            );
            if !self.wait_before_reconnect(delay).await {
                break;
            }
        }

        self.set_state(ConnectionState::Disconnected);
        logger::info(LogTag::Connector, "Connector stopped");
    }

    /// Open a connection while still accepting commands
    ///
    /// `Ok(None)` means shutdown was requested before the connect finished.
    async fn connect(&mut self) -> Result<Option<WsStream>, ConnectorError> {
        let attempt = timeout(CONNECT_TIMEOUT, connect_async(self.url.clone()));
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                result = &mut attempt => {
                    return match result {
                        Ok(Ok((stream, _response))) => Ok(Some(stream)),
                        Ok(Err(e)) => Err(ConnectorError::Connect(e)),
                        Err(_) => Err(ConnectorError::Timeout(CONNECT_TIMEOUT)),
                    };
                }
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => return Ok(None),
                    Some(command) => self.remember(&command),
                },
            }
        }
    }

    /// Drive one established connection until it ends
    async fn session(&mut self, stream: WsStream) -> SessionEnd {
        let (mut sink, mut stream) = stream.split();

        if let Err(reason) = self.replay(&mut sink).await {
            return SessionEnd::Dropped(reason);
        }

        let mut ping = heartbeat_ticker(self.ping_interval);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let command = match command {
                        Some(Command::Shutdown) | None => {
                            // The server may have stopped reading
                            let _ = timeout(self.write_wait(), sink.send(Message::Close(None))).await;
                            return SessionEnd::Shutdown;
                        }
                        Some(command) => command,
                    };
                    self.remember(&command);
                    let envelope = match command {
                        Command::Subscribe(environments) => Envelope::subscribe(environments),
                        Command::Unsubscribe(environments) => Envelope::unsubscribe(environments),
                        Command::Authenticate(payload) => Envelope::authenticate(payload),
                        Command::Shutdown => continue,
                    };
                    if let Err(reason) = send_envelope(&mut sink, &envelope, self.write_wait()).await {
                        return SessionEnd::Dropped(reason);
                    }
                }

                _ = ping.tick() => {
                    if let Err(reason) = send_envelope(&mut sink, &Envelope::ping(), self.write_wait()).await {
                        return SessionEnd::Dropped(reason);
                    }
                }

                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Close(_))) | None => {
                        return SessionEnd::Dropped("closed by server".to_string());
                    }
                    // Control frames are answered by the socket layer
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                },
            }
        }
    }

    /// Re-send the authenticate payload and the whole desired set
    async fn replay(&self, sink: &mut SplitSink<WsStream, Message>) -> Result<(), String> {
        if let Some(payload) = &self.auth {
            send_envelope(sink, &Envelope::authenticate(payload.clone()), self.write_wait()).await?;
        }
        if !self.desired.is_empty() {
            let environments: Vec<String> = self.desired.iter().cloned().collect();
            logger::debug(
                LogTag::Connector,
                &format!("Resubscribing to {:?}", environments),
            );
            send_envelope(sink, &Envelope::subscribe(environments), self.write_wait()).await?;
        }
        Ok(())
    }

    /// Sleep out the reconnect delay, buffering commands meanwhile
    ///
    /// Returns false when shutdown was requested.
    async fn wait_before_reconnect(&mut self, delay: Duration) -> bool {
        let pause = sleep(delay);
        tokio::pin!(pause);

        loop {
            tokio::select! {
                _ = &mut pause => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => return false,
                    Some(command) => self.remember(&command),
                },
            }
        }
    }

    /// Deadline for one outbound frame, including the final close
    fn write_wait(&self) -> Duration {
        self.ping_interval.min(MAX_WRITE_WAIT)
    }

    /// Record a command's effect on the state replayed after connect
    fn remember(&mut self, command: &Command) {
        match command {
            Command::Subscribe(environments) => {
                self.desired.extend(environments.iter().cloned());
            }
            Command::Unsubscribe(environments) => {
                for environment_id in environments {
                    self.desired.remove(environment_id);
                }
            }
            Command::Authenticate(payload) => self.auth = Some(payload.clone()),
            Command::Shutdown => {}
        }
    }

    /// Route one inbound text frame (possibly several envelopes) to the owner
    fn dispatch(&self, text: &str) {
        for message in ServerMessage::parse_frame(text) {
            match message {
                Ok(ServerMessage::StatusUpdate(update)) => {
                    self.emit(ConnectorEvent::StatusUpdate(update))
                }
                Ok(ServerMessage::OperationUpdate(update)) => {
                    self.emit(ConnectorEvent::OperationUpdate(update))
                }
                Ok(ServerMessage::Subscribed(environments)) => {
                    self.emit(ConnectorEvent::Subscribed(environments))
                }
                Ok(ServerMessage::Unsubscribed(environments)) => {
                    self.emit(ConnectorEvent::Unsubscribed(environments))
                }
                Ok(ServerMessage::Pong) => logger::verbose(LogTag::Connector, "pong"),
                Err(e) => logger::warning(
                    LogTag::Connector,
                    &format!("Ignoring server frame: {}", e),
                ),
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            logger::info(
                LogTag::Connector,
                &format!("{} -> {} ({})", previous, state, self.url),
            );
            self.emit(ConnectorEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: ConnectorEvent) {
        // The owner may have stopped listening
        let _ = self.events.send(event);
    }
}

async fn send_envelope(
    sink: &mut SplitSink<WsStream, Message>,
    envelope: &Envelope,
    wait: Duration,
) -> Result<(), String> {
    let text = envelope.to_json().map_err(|e| e.to_string())?;
    match timeout(wait, sink.send(Message::Text(text))).await {
        Ok(sent) => sent.map_err(|e| e.to_string()),
        Err(_) => Err(format!("write timed out after {:?}", wait)),
    }
}

fn validate_url(raw: &str) -> Result<(), ConnectorError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConnectorError::Url(format!("{}: {}", raw, e)))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        scheme => Err(ConnectorError::Url(format!(
            "{}: unsupported scheme '{}'",
            raw, scheme
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    fn offline_connector() -> (Connector, mpsc::UnboundedReceiver<ConnectorEvent>) {
        let (connector, _commands, events, _state) = Connector::new(
            "ws://127.0.0.1:9/ws",
            ReconnectPolicy::default(),
            Duration::from_secs(30),
        )
        .unwrap();
        (connector, events)
    }

    #[test]
    fn test_rejects_non_websocket_urls() {
        assert!(matches!(validate_url("http://host/ws"), Err(ConnectorError::Url(_))));
        assert!(matches!(validate_url("not a url"), Err(ConnectorError::Url(_))));
        assert!(validate_url("wss://host:443/ws").is_ok());
    }

    #[test]
    fn test_buffered_subscriptions_round_trip() {
        let (mut connector, _events) = offline_connector();

        connector.remember(&Command::Subscribe(vec!["env-1".to_string(), "env-2".to_string()]));
        connector.remember(&Command::Unsubscribe(vec!["env-1".to_string()]));
        connector.remember(&Command::Subscribe(vec!["env-3".to_string()]));
        connector.remember(&Command::Authenticate(json!({"token": "t"})));

        let desired: Vec<&str> = connector.desired.iter().map(String::as_str).collect();
        assert_eq!(desired, vec!["env-2", "env-3"]);
        assert_eq!(connector.auth, Some(json!({"token": "t"})));
    }

    #[test]
    fn test_dispatch_splits_and_routes_frames() {
        let (connector, mut events) = offline_connector();

        let frame = format!(
            "{}\n{}\n{}\n{}",
            Envelope::status_update("env-1", json!("up")).to_json().unwrap(),
            r#"{"type":"mystery","payload":{}}"#,
            Envelope::operation_update("op-1", json!({"status": "done"}))
                .to_json()
                .unwrap(),
            Envelope::pong().to_json().unwrap(),
        );
        connector.dispatch(&frame);

        match events.try_recv().unwrap() {
            ConnectorEvent::StatusUpdate(update) => assert_eq!(update.environment_id, "env-1"),
            other => panic!("unexpected {:?}", other),
        }
        match events.try_recv().unwrap() {
            ConnectorEvent::OperationUpdate(update) => assert_eq!(update.operation_id, "op-1"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_state_changes_are_reported_once() {
        let (connector, mut events) = offline_connector();

        connector.set_state(ConnectionState::Connecting);
        connector.set_state(ConnectionState::Connecting);

        assert_eq!(
            events.try_recv().unwrap(),
            ConnectorEvent::StateChanged(ConnectionState::Connecting)
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_gives_up_when_unreachable() {
        // Reserve a port, then free it so nothing listens there
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let policy = ReconnectPolicy::Exponential {
            initial: Duration::from_millis(5),
            max: Duration::from_millis(20),
            multiplier: 2.0,
            jitter: 0.0,
            max_attempts: Some(2),
        };
        let (handle, mut events) = Connector::spawn_with(
            &format!("ws://127.0.0.1:{}/ws", port),
            policy,
            Duration::from_secs(30),
        )
        .unwrap();

        let gave_up = timeout(Duration::from_secs(5), async {
            while let Some(event) = events.recv().await {
                if let ConnectorEvent::GaveUp { attempts } = event {
                    return Some(attempts);
                }
            }
            None
        })
        .await
        .unwrap();

        assert_eq!(gave_up, Some(2));
        handle.join().await;
    }

    #[tokio::test]
    async fn test_shutdown_with_stalled_server_is_bounded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());

        // Completes the handshake, then never reads again
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            sleep(Duration::from_secs(30)).await;
            drop(ws);
        });

        let (handle, _events) = Connector::spawn_with(
            &url,
            ReconnectPolicy::Fixed(Duration::from_secs(60)),
            Duration::from_millis(200),
        )
        .unwrap();
        let connected = timeout(
            Duration::from_secs(5),
            handle.wait_for_state(ConnectionState::Connected),
        )
        .await
        .unwrap();
        assert!(connected);

        // Far larger than both socket buffers
        let environments: Vec<String> = (0..1_000_000)
            .map(|i| format!("environment-{:08}", i))
            .collect();
        handle.subscribe(environments);
        sleep(Duration::from_millis(50)).await;
        handle.shutdown();

        timeout(Duration::from_secs(3), handle.join()).await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn test_shutdown_while_retrying() {
        let (handle, _events) = Connector::spawn_with(
            "ws://127.0.0.1:9/ws",
            ReconnectPolicy::Fixed(Duration::from_secs(60)),
            Duration::from_secs(30),
        )
        .unwrap();

        handle.subscribe(vec!["env-1".to_string()]);
        handle.shutdown();

        timeout(Duration::from_secs(5), handle.join()).await.unwrap();
    }
}
