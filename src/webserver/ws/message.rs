/// WebSocket message schema
///
/// Every frame in either direction is a JSON object with exactly two fields:
/// - `type`: tag from the fixed [`MessageType`] vocabulary
/// - `payload`: type-specific body, opaque to the envelope
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::errors::ProtocolError;

// ============================================================================
// MESSAGE TYPES
// ============================================================================

/// Recognized message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // Client -> server
    Ping,
    Subscribe,
    Unsubscribe,
    Authenticate,

    // Server -> client
    Pong,
    StatusUpdate,
    OperationUpdate,
    Subscribed,
    Unsubscribed,
}

impl MessageType {
    /// Wire tag used in the envelope's `type` field
    pub fn code(&self) -> &'static str {
        match self {
            MessageType::Ping => "ping",
            MessageType::Subscribe => "subscribe",
            MessageType::Unsubscribe => "unsubscribe",
            MessageType::Authenticate => "authenticate",
            MessageType::Pong => "pong",
            MessageType::StatusUpdate => "status_update",
            MessageType::OperationUpdate => "operation_update",
            MessageType::Subscribed => "subscribed",
            MessageType::Unsubscribed => "unsubscribed",
        }
    }

    /// Parse type from wire tag
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "ping" => Some(MessageType::Ping),
            "subscribe" => Some(MessageType::Subscribe),
            "unsubscribe" => Some(MessageType::Unsubscribe),
            "authenticate" => Some(MessageType::Authenticate),
            "pong" => Some(MessageType::Pong),
            "status_update" => Some(MessageType::StatusUpdate),
            "operation_update" => Some(MessageType::OperationUpdate),
            "subscribed" => Some(MessageType::Subscribed),
            "unsubscribed" => Some(MessageType::Unsubscribed),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// ENVELOPE
// ============================================================================

/// Wire envelope `{type, payload}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,

    /// Absent payloads decode as `null`
    #[serde(default)]
    pub payload: Value,
}

/// Payload of subscribe/unsubscribe (and their acknowledgements)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentList {
    pub environments: Vec<String>,
}

/// Payload of status_update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub environment_id: String,
    pub status: Value,
}

/// Payload of operation_update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationUpdate {
    pub operation_id: String,
    pub update: Value,
}

impl Envelope {
    pub fn new(kind: MessageType, payload: Value) -> Self {
        Self {
            kind: kind.code().to_string(),
            payload,
        }
    }

    pub fn ping() -> Self {
        Self::new(MessageType::Ping, Value::Null)
    }

    pub fn pong() -> Self {
        Self::new(MessageType::Pong, Value::Null)
    }

    pub fn subscribe(environments: Vec<String>) -> Self {
        Self::new(MessageType::Subscribe, environment_list(environments))
    }

    pub fn unsubscribe(environments: Vec<String>) -> Self {
        Self::new(MessageType::Unsubscribe, environment_list(environments))
    }

    pub fn authenticate(payload: Value) -> Self {
        Self::new(MessageType::Authenticate, payload)
    }

    pub fn subscribed(environments: Vec<String>) -> Self {
        Self::new(MessageType::Subscribed, environment_list(environments))
    }

    pub fn unsubscribed(environments: Vec<String>) -> Self {
        Self::new(MessageType::Unsubscribed, environment_list(environments))
    }

    pub fn status_update(environment_id: &str, status: Value) -> Self {
        Self::new(
            MessageType::StatusUpdate,
            serde_json::json!({ "environmentId": environment_id, "status": status }),
        )
    }

    pub fn operation_update(operation_id: &str, update: Value) -> Self {
        Self::new(
            MessageType::OperationUpdate,
            serde_json::json!({ "operationId": operation_id, "update": update }),
        )
    }

    /// Recognized type of this envelope, if any
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_code(&self.kind)
    }

    /// Decode one text frame into an envelope
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to JSON text
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize into a frame that can be shared by several outboxes
    pub fn encode(&self) -> Result<std::sync::Arc<str>, serde_json::Error> {
        self.to_json().map(std::sync::Arc::from)
    }

    /// Decode the payload into a typed body
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.payload.clone()).map_err(|source| ProtocolError::InvalidPayload {
            kind: self.kind.clone(),
            source,
        })
    }
}

fn environment_list(environments: Vec<String>) -> Value {
    serde_json::json!({ "environments": environments })
}

// ============================================================================
// CLIENT COMMANDS (Client -> Server)
// ============================================================================

/// Decoded client -> server control message
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Ping,
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    Authenticate(Value),
}

impl ClientCommand {
    /// Decode an envelope received by the server
    ///
    /// Server -> client types arriving at the server count as unknown.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        match envelope.message_type() {
            Some(MessageType::Ping) => Ok(ClientCommand::Ping),
            Some(MessageType::Subscribe) => {
                let list: EnvironmentList = envelope.payload_as()?;
                Ok(ClientCommand::Subscribe(list.environments))
            }
            Some(MessageType::Unsubscribe) => {
                let list: EnvironmentList = envelope.payload_as()?;
                Ok(ClientCommand::Unsubscribe(list.environments))
            }
            Some(MessageType::Authenticate) => Ok(ClientCommand::Authenticate(envelope.payload.clone())),
            _ => Err(ProtocolError::UnknownType(envelope.kind.clone())),
        }
    }

    /// Decode one text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Self::from_envelope(&Envelope::parse(text)?)
    }
}

// ============================================================================
// SERVER MESSAGES (Server -> Client)
// ============================================================================

/// Decoded server -> client message, as seen by the connector
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Pong,
    StatusUpdate(StatusUpdate),
    OperationUpdate(OperationUpdate),
    Subscribed(Vec<String>),
    Unsubscribed(Vec<String>),
}

impl ServerMessage {
    /// Decode an envelope received by a peer
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        match envelope.message_type() {
            Some(MessageType::Pong) => Ok(ServerMessage::Pong),
            Some(MessageType::StatusUpdate) => Ok(ServerMessage::StatusUpdate(envelope.payload_as()?)),
            Some(MessageType::OperationUpdate) => {
                Ok(ServerMessage::OperationUpdate(envelope.payload_as()?))
            }
            Some(MessageType::Subscribed) => {
                let list: EnvironmentList = envelope.payload_as()?;
                Ok(ServerMessage::Subscribed(list.environments))
            }
            Some(MessageType::Unsubscribed) => {
                let list: EnvironmentList = envelope.payload_as()?;
                Ok(ServerMessage::Unsubscribed(list.environments))
            }
            _ => Err(ProtocolError::UnknownType(envelope.kind.clone())),
        }
    }

    /// Decode a text frame that may carry several newline-delimited envelopes
    pub fn parse_frame(text: &str) -> Vec<Result<Self, ProtocolError>> {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Envelope::parse(line).and_then(|env| Self::from_envelope(&env)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_type_codes() {
        for kind in [
            MessageType::Ping,
            MessageType::Subscribe,
            MessageType::Unsubscribe,
            MessageType::Authenticate,
            MessageType::Pong,
            MessageType::StatusUpdate,
            MessageType::OperationUpdate,
            MessageType::Subscribed,
            MessageType::Unsubscribed,
        ] {
            assert_eq!(MessageType::from_code(kind.code()), Some(kind));
        }
        assert_eq!(MessageType::from_code("Ping"), None);
    }

    #[test]
    fn test_envelope_has_exactly_two_fields() {
        let json = Envelope::status_update("env-1", json!({"state": "running"}))
            .to_json()
            .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "status_update",
                "payload": {"environmentId": "env-1", "status": {"state": "running"}}
            })
        );
    }

    #[test]
    fn test_operation_update_shape() {
        let env = Envelope::operation_update("op-42", json!({"status": "completed"}));
        assert_eq!(env.kind, "operation_update");
        assert_eq!(env.payload["operationId"], "op-42");
        assert_eq!(env.payload["update"]["status"], "completed");
    }

    #[test]
    fn test_ping_without_payload() {
        let cmd = ClientCommand::parse(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::Ping);

        let pong = Envelope::pong().to_json().unwrap();
        assert_eq!(pong, r#"{"type":"pong","payload":null}"#);
    }

    #[test]
    fn test_subscribe_decoding() {
        let cmd = ClientCommand::parse(r#"{"type":"subscribe","payload":{"environments":["a","b"]}}"#)
            .unwrap();
        assert_eq!(cmd, ClientCommand::Subscribe(vec!["a".to_string(), "b".to_string()]));

        let cmd = ClientCommand::parse(r#"{"type":"unsubscribe","payload":{"environments":[]}}"#)
            .unwrap();
        assert_eq!(cmd, ClientCommand::Unsubscribe(vec![]));
    }

    #[test]
    fn test_authenticate_payload_is_opaque() {
        let cmd = ClientCommand::parse(r#"{"type":"authenticate","payload":{"token":"t"}}"#).unwrap();
        assert_eq!(cmd, ClientCommand::Authenticate(json!({"token": "t"})));
    }

    #[test]
    fn test_protocol_errors() {
        assert!(matches!(
            ClientCommand::parse("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            ClientCommand::parse(r#"{"payload":{}}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            ClientCommand::parse(r#"{"type":"launch_missiles","payload":{}}"#),
            Err(ProtocolError::UnknownType(t)) if t == "launch_missiles"
        ));
        assert!(matches!(
            ClientCommand::parse(r#"{"type":"subscribe","payload":{"environments":"env-1"}}"#),
            Err(ProtocolError::InvalidPayload { .. })
        ));
        // Server-bound only accepts client commands
        assert!(matches!(
            ClientCommand::parse(r#"{"type":"status_update","payload":{}}"#),
            Err(ProtocolError::UnknownType(_))
        ));
    }

    #[test]
    fn test_server_message_frame_splitting() {
        let frame = format!(
            "{}\n{}",
            Envelope::status_update("env-1", json!("up")).to_json().unwrap(),
            Envelope::subscribed(vec!["env-1".to_string()]).to_json().unwrap()
        );
        let messages = ServerMessage::parse_frame(&frame);

        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0].as_ref().unwrap(),
            &ServerMessage::StatusUpdate(StatusUpdate {
                environment_id: "env-1".to_string(),
                status: json!("up"),
            })
        );
        assert_eq!(
            messages[1].as_ref().unwrap(),
            &ServerMessage::Subscribed(vec!["env-1".to_string()])
        );
    }
}
