//! Session configuration and the reconnection policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, SessionError};
use crate::types::AudioSpec;

/// Configuration for one playback session.
///
/// Durations are carried as milliseconds so the whole struct round-trips
/// through serde config files unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Endpoint the transport connects to, e.g. `ws://host:port/stream`.
    pub url: String,

    /// Stream format the audio device is configured with.
    pub audio: AudioSpec,

    /// Target latency window the buffer absorbs, in milliseconds of audio.
    pub buffer_latency_ms: u64,

    /// Upper bound on a single received frame; larger frames are malformed.
    pub max_frame_bytes: usize,

    /// Playback chunk duration per pacing tick.
    pub chunk_ms: u64,

    /// Consecutive short pulls before playback is reported degraded.
    pub underrun_tolerance: u32,

    /// Bound on transport connect plus open handshake.
    pub connect_timeout_ms: u64,

    /// Default bound on draining buffered audio at teardown. `stop` may
    /// override this per call.
    pub drain_timeout_ms: u64,

    pub reconnect: ReconnectPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            audio: AudioSpec::default(),
            buffer_latency_ms: 200,
            max_frame_bytes: 64 * 1024,
            chunk_ms: 20,
            underrun_tolerance: 5,
            connect_timeout_ms: 5_000,
            drain_timeout_ms: 1_000,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Buffer capacity in bytes for the configured latency window, never
    /// smaller than one playback chunk.
    pub fn buffer_capacity(&self) -> usize {
        let latency = self.audio.bytes_for(Duration::from_millis(self.buffer_latency_ms));
        latency.max(self.chunk_bytes()).max(self.audio.block_size())
    }

    /// Bytes the driver pulls per pacing tick.
    pub fn chunk_bytes(&self) -> usize {
        self.audio.bytes_for(Duration::from_millis(self.chunk_ms)).max(self.audio.block_size())
    }

    pub fn chunk_period(&self) -> Duration {
        Duration::from_millis(self.chunk_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(SessionError::config("url must not be empty"));
        }
        if self.audio.sample_rate == 0 {
            return Err(SessionError::config("sample_rate must be positive"));
        }
        if self.chunk_ms == 0 {
            return Err(SessionError::config("chunk_ms must be positive"));
        }
        if self.buffer_latency_ms < self.chunk_ms {
            return Err(SessionError::config("buffer_latency_ms must cover at least one chunk"));
        }
        if self.max_frame_bytes == 0 {
            return Err(SessionError::config("max_frame_bytes must be positive"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(SessionError::config("connect_timeout_ms must be positive"));
        }
        Ok(())
    }
}

/// Exponential backoff between reconnection attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Reconnection attempts after the initial connect, 0 disables retry.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnection attempt `attempt` (0-based):
    /// `base * 2^attempt`, capped at `max_delay_ms`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Options for a graceful stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StopOptions {
    /// Bound on playing out buffered audio before forced teardown.
    pub drain_timeout_ms: u64,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self { drain_timeout_ms: 1_000 }
    }
}

impl StopOptions {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
