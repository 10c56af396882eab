//! Hubview client - live viewer for producers publishing to a room hub.
//!
//! This crate holds the subscriber side: the reconnecting session state
//! machine, payload normalization, the per-producer aggregator and the
//! tokio driver that binds them to a WebSocket.

#[macro_use]
pub mod logging;

pub mod aggregator;
pub mod config;
pub mod credential;
pub mod display;
pub mod event_log;
pub mod normalize;
pub mod session;
pub mod storage;
pub mod ws;

pub use aggregator::{ProducerRecord, ProducerTable};
pub use config::{ClientConfig, SessionConfig};
pub use credential::{Credential, CredentialProvider, HttpCredentialProvider, Secret};
pub use event_log::{EventLog, LogEntry, LogKind};
pub use session::{ConnectionState, Session, SessionIo, SessionView};
pub use storage::{Preferences, Store};
pub use ws::{spawn_session, DriverOptions, SessionCommand, SessionHandle};
