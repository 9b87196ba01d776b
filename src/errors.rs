/// Error types for the notification subsystem
///
/// The blast radius of every error here is a single connection, except
/// `ConfigError` which only occurs at startup.
use thiserror::Error;

use crate::webserver::ws::client::ClientId;

// =============================================================================
// REGISTRY ERRORS
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("Client {0} is already registered")]
    DuplicateClient(ClientId),

    #[error("Hub is at capacity ({limit} connections)")]
    AtCapacity { limit: usize },
}

// =============================================================================
// OUTBOX ERRORS
// =============================================================================

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("Client is closed")]
    Closed,

    #[error("Outbox full ({capacity} frames pending)")]
    OutboxFull { capacity: usize },
}

// =============================================================================
// PROTOCOL ERRORS
// =============================================================================

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid payload for '{kind}': {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

// =============================================================================
// DISCONNECT REASONS
// =============================================================================

/// Why a Client Actor tore its connection down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    PeerClosed,
    Transport(String),
    LivenessTimeout,
    WriteTimeout,
    OutboxFull,
    Shutdown,
}

impl DisconnectReason {
    /// Reasons that point at a misbehaving or unreachable peer
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            DisconnectReason::LivenessTimeout
                | DisconnectReason::WriteTimeout
                | DisconnectReason::OutboxFull
        )
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::PeerClosed => write!(f, "peer closed"),
            DisconnectReason::Transport(e) => write!(f, "transport error: {}", e),
            DisconnectReason::LivenessTimeout => write!(f, "liveness timeout"),
            DisconnectReason::WriteTimeout => write!(f, "write timeout"),
            DisconnectReason::OutboxFull => write!(f, "outbox full"),
            DisconnectReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

// =============================================================================
// CONNECTOR ERRORS
// =============================================================================

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid URL: {0}")]
    Url(String),

    #[error("Connect timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Gave up after {attempts} reconnect attempts")]
    RetriesExhausted { attempts: u32 },
}

// =============================================================================
// CONFIGURATION ERRORS
// =============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Config already initialized")]
    AlreadyInitialized,
}
