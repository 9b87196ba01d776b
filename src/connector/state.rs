/// Connector states and the events it reports to its owner
use std::fmt;

use crate::webserver::ws::message::{OperationUpdate, StatusUpdate};

/// `Disconnected → Connecting → Connected`, back to `Disconnected` on any close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        write!(f, "{}", name)
    }
}

/// Everything the connector observes, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorEvent {
    StateChanged(ConnectionState),
    StatusUpdate(StatusUpdate),
    OperationUpdate(OperationUpdate),
    /// Server confirmed a subscribe
    Subscribed(Vec<String>),
    /// Server confirmed an unsubscribe
    Unsubscribed(Vec<String>),
    /// Reconnect policy exhausted; the connector has stopped
    GaveUp { attempts: u32 },
}

/// Requests from the handle to the connector task
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    Authenticate(serde_json::Value),
    Shutdown,
}
