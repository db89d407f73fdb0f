//! Transport seam for the playback core.
//!
//! The core never frames bytes itself; it consumes connection events from an
//! injected transport. Callback-style sources (platform socket stacks that
//! deliver onOpen/onMessage/onClose) adapt by forwarding their callbacks into
//! an mpsc channel whose receiver implements [`TransportConn`]; ordering per
//! connection is preserved either way.

use bytes::Bytes;

use crate::error::Result;

/// Event delivered by an open connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection handshake completed; must precede any other event.
    Opened,
    /// A binary message carrying PCM sample bytes.
    Binary(Bytes),
    /// Peer initiated the closing handshake.
    Closing { code: u16, reason: String },
    /// Connection fully closed.
    Closed { code: u16, reason: String },
    /// Transport-level failure; the connection is unusable afterwards.
    Error(String),
}

/// Factory for connections; one `open` per connection attempt.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Initiates a connection to `url`.
    ///
    /// Resolving `Ok` means the attempt was accepted, not that the handshake
    /// finished: the connection confirms readiness by emitting
    /// [`TransportEvent::Opened`] as its first event.
    async fn open(&self, url: &str) -> Result<Box<dyn TransportConn>>;
}

/// A single connection's event stream plus its close primitive.
#[async_trait::async_trait]
pub trait TransportConn: Send + 'static {
    /// Next connection event; `None` once the underlying stream is exhausted.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Begins the closing handshake. Safe to call more than once.
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

#[cfg(feature = "websocket")]
mod ws;
#[cfg(feature = "websocket")]
pub use ws::WsTransport;
