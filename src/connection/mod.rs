//! Connection to the generation backend.
//!
//! [`machine`] holds the transport-independent state transitions and
//! [`client`] runs them over a WebSocket with automatic reconnect.

pub mod client;
pub mod machine;

pub use client::{ClientConfig, StreamClient, Subscription, DEFAULT_RECONNECT_DELAY};
pub use machine::{ConnectionMachine, ConnectionState, CONNECTION_ERROR_MESSAGE};
