//! envhub - real-time environment notification hub
//!
//! - `webserver::ws`: hub, per-connection client actors, wire protocol
//! - `connector`: reconnecting peer-side client
//! - `config`, `logger`, `arguments`, `errors`: ambient infrastructure

pub mod arguments;
pub mod config;
pub mod connector;
pub mod errors;
pub mod logger;
pub mod run;
pub mod webserver;
