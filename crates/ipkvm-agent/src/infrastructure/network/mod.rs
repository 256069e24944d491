//! Network infrastructure: the viewer-facing stream server.
//!
//! # Sub-modules
//!
//! - **`ws_server`** – WebSocket server that broadcasts encoded H.264
//!   packets to every connected viewer and buffers the control messages
//!   viewers send back (keyboard and mouse input).
//!
//! - **`mock`** – In-memory server and factory for tests.
//!
//! The orchestrator only sees the [`StreamServer`] trait. It polls the
//! server from its own worker thread, so the trait is synchronous; the
//! WebSocket implementation hides its async runtime behind it.

pub mod mock;
pub mod ws_server;

use thiserror::Error;

pub use ws_server::{WebSocketServerFactory, WebSocketStreamServer};

/// Viewer messages buffered between two drains. Messages arriving while the
/// buffer is full are dropped.
pub const INBOUND_CAPACITY: usize = 256;

/// Error type for stream server construction.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The listening socket could not be bound.
    #[error("failed to bind stream server on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The server's async runtime could not be started.
    #[error("failed to start network runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// A message source and broadcast sink for network viewers.
pub trait StreamServer {
    /// The port actually bound (differs from the requested one for port 0).
    fn port(&self) -> u16;

    /// Number of viewers currently connected.
    fn client_count(&self) -> usize;

    /// Removes and returns every buffered inbound message, oldest first.
    /// At most [`INBOUND_CAPACITY`] messages are buffered.
    fn drain_messages(&mut self) -> Vec<Vec<u8>>;

    /// Sends `packet` to every connected viewer.
    fn broadcast(&self, packet: &[u8]);
}

/// Builds stream servers on demand.
pub trait ServerFactory: Send {
    /// # Errors
    ///
    /// Returns [`NetworkError`] if the server cannot listen on `port`.
    fn bind(&self, port: u16) -> Result<Box<dyn StreamServer>, NetworkError>;
}
