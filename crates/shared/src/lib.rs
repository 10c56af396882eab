//! Shared types for the hubview client: the hub's wire protocol, the
//! credential issuer's request/response bodies, and the error taxonomy.

pub mod error;
pub mod protocol;

pub use error::*;
pub use protocol::*;
