/// Real-time notification layer
///
/// One persistent connection per peer, multiplexing per-environment status
/// updates and operation progress.
///
/// ## Key Components
/// - `message`: `{type, payload}` envelope and the fixed type vocabulary
/// - `client`: per-connection actor with its read and write loops
/// - `hub`: registry of live clients and broadcast fan-out
/// - `health`: heartbeat and liveness timing
/// - `metrics`: per-connection and hub-level counters
/// - `sources`: update producers that feed the hub
pub mod client;
pub mod health;
pub mod hub;
pub mod message;
pub mod metrics;
pub mod sources;

pub use client::{ClientActor, ClientHandle, ClientId};
pub use hub::{Hub, HubLink};
pub use message::{ClientCommand, Envelope, MessageType, ServerMessage};
