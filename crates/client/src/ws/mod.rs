//! Runtime binding of the session core to tokio and tokio-tungstenite.
//!
//! ```text
//!  SessionHandle ──commands──▶ driver task ◀──inputs── connection tasks
//!        ▲                        │  owns Session       timer tasks
//!        └──────watch<SessionView>┘                     credential fetches
//! ```
//!
//! All session mutation happens on the driver task, one input at a time.
//! Every other task only posts inputs to it.

mod connection;
mod driver;

pub use driver::{spawn_session, DriverOptions, SessionCommand, SessionHandle};
