//! Audio frames and stream format description.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A received chunk of PCM sample bytes.
///
/// The sequence number is assigned at receipt and is non-decreasing in the
/// order frames are enqueued. A frame that fails validation still consumes a
/// sequence number, so the gap between `frames_received` and
/// `frames_enqueued` stays observable through stats.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Monotonically increasing receipt order.
    pub seq: u64,
    /// Raw PCM sample bytes, format per the session's [`AudioSpec`].
    pub payload: Bytes,
}

/// PCM sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Signed 16-bit little-endian.
    S16Le,
    /// Unsigned 8-bit.
    U8,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
            SampleFormat::U8 => 1,
        }
    }

    /// Byte value representing silence, used to pad playback shortfalls.
    pub fn silence_byte(&self) -> u8 {
        match self {
            SampleFormat::S16Le => 0x00,
            // Unsigned 8-bit centers at 128
            SampleFormat::U8 => 0x80,
        }
    }
}

/// Output channel arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

/// Stream format the audio device is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: ChannelLayout,
    pub format: SampleFormat,
}

impl AudioSpec {
    /// Bytes per interleaved sample frame (all channels, one sample each).
    pub fn block_size(&self) -> usize {
        self.channels.channels() * self.format.bytes_per_sample()
    }

    /// Playback byte rate in bytes per second.
    pub fn byte_rate(&self) -> usize {
        self.sample_rate as usize * self.block_size()
    }

    /// Number of bytes covering `duration` of audio, rounded down to a whole
    /// sample block so chunk boundaries never split a sample.
    pub fn bytes_for(&self, duration: Duration) -> usize {
        let raw = (self.byte_rate() as u128 * duration.as_nanos()) / 1_000_000_000;
        let block = self.block_size();
        (raw as usize / block) * block
    }

    /// Playback duration of `bytes` at this spec's rate.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let rate = self.byte_rate();
        if rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((bytes as u128 * 1_000_000_000 / rate as u128) as u64)
    }
}

impl Default for AudioSpec {
    /// 16 kHz mono PCM16, the format the reference endpoint streams.
    fn default() -> Self {
        Self { sample_rate: 16_000, channels: ChannelLayout::Mono, format: SampleFormat::S16Le }
    }
}
