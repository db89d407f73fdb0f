//! Core data types shared across the pipeline.

mod frame;
mod state;
mod stats;

pub use frame::{AudioFrame, AudioSpec, ChannelLayout, SampleFormat};
pub use state::SessionState;
pub use stats::{SharedStats, StatsSnapshot};
