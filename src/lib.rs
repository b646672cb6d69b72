//! Streaming client for a document generation backend.
//!
//! Frames arrive over a reconnecting WebSocket ([`connection`]), are reduced
//! into raw document content ([`reassembler`]) and revealed one HTML-safe
//! token at a time ([`scanner`], [`render`]). [`session`] wires the pieces
//! together.

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod export;
pub mod history;
pub mod logging;
pub mod protocol;
pub mod reassembler;
pub mod render;
pub mod scanner;
pub mod session;
pub mod stats;

pub use connection::{ClientConfig, ConnectionState, StreamClient, Subscription};
pub use events::SessionEvent;
pub use protocol::{ClientRequest, WireMessage};
pub use reassembler::{ChunkMode, Lifecycle};
pub use session::{Session, SessionOptions, SharedSession};
