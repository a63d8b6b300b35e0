//! Streaming-broker transport.
//!
//! The broker owns the browser-facing fan-out; the adapter keeps one TCP
//! session to it, answers subscribe/unsubscribe requests and publishes
//! item updates. [`protocol`] holds the line format, [`session`] the
//! connection driver.

pub mod protocol;
pub mod session;

pub use protocol::{Outbound, Request};
pub use session::{Inbound, Responder, SessionConfig, SessionHandle, connect};
