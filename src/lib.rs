//! Streaming audio playback core: receive PCM frames over a transport and
//! play them through an audio output with bounded latency.
//!
//! Earshot owns the path between a frame-oriented transport (WebSocket by
//! default) and an audio device: a bounded ring buffer that absorbs network
//! jitter by dropping the oldest audio, a paced playback driver that pads
//! underruns with silence, and a connection session that reconnects with
//! exponential backoff when the transport drops.
//!
//! # Features
//!
//! - **Bounded latency**: a full buffer drops the oldest audio, never the
//!   newest, so playback stays close to live
//! - **Underrun tolerance**: short gaps are padded with silence; sustained
//!   starvation is surfaced as a degraded flag, not a failure
//! - **Resilient transport**: reconnects with exponential backoff, with the
//!   audio pipeline kept intact across outages
//! - **Injectable seams**: [`Transport`] and [`AudioOutput`] are traits, so
//!   the whole pipeline runs against scripted fakes in tests
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use earshot::{Earshot, SessionConfig, StopOptions};
//!
//! # struct Speaker;
//! # impl earshot::AudioOutput for Speaker {
//! #     fn start(&mut self) -> earshot::Result<()> { Ok(()) }
//! #     fn write(&mut self, data: &[u8]) -> earshot::Result<usize> { Ok(data.len()) }
//! #     fn stop(&mut self) -> earshot::Result<()> { Ok(()) }
//! #     fn release(&mut self) {}
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig {
//!         url: "ws://hearing-aid.local:8080/stream".into(),
//!         ..SessionConfig::default()
//!     };
//!
//!     let handle = Earshot::start(Box::new(Speaker), config).await?;
//!     println!("state: {}", handle.status().state);
//!
//!     // ... later
//!     let final_state = handle.stop(StopOptions::default()).await;
//!     println!("stopped in {final_state}");
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod buffer;
mod config;
mod device;
mod error;
#[cfg(test)]
pub mod test_utils;
pub mod types;

// Pipeline tasks
pub mod driver;
pub mod session;
pub mod supervisor;
pub mod transport;

// Core exports
pub use buffer::{BufferConsumer, BufferProducer, FrameBuffer, Overrun};
pub use config::{ReconnectPolicy, SessionConfig, StopOptions};
pub use device::AudioOutput;
pub use error::{Result, SessionError};
pub use supervisor::{SessionHandle, SessionStatus, SessionSupervisor};
pub use transport::{Transport, TransportConn, TransportEvent};
pub use types::{AudioFrame, AudioSpec, ChannelLayout, SampleFormat, SessionState, StatsSnapshot};

#[cfg(feature = "websocket")]
pub use transport::WsTransport;

use std::sync::Arc;

/// Entry point for the common case: stream over WebSocket into a device.
///
/// For a custom transport, use [`SessionSupervisor::start`] directly.
pub struct Earshot;

#[cfg(feature = "websocket")]
impl Earshot {
    /// Connects to `config.url` over WebSocket and plays received audio into
    /// `device`.
    pub async fn start(
        device: Box<dyn AudioOutput>,
        config: SessionConfig,
    ) -> Result<SessionHandle> {
        SessionSupervisor::start(Arc::new(WsTransport::default()), device, config).await
    }
}
