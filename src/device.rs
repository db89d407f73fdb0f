//! Audio output seam.

use crate::error::Result;

/// Playback device capability injected into the pacing loop.
///
/// An implementation is constructed for a single stream format
/// ([`crate::types::AudioSpec`]) and released exactly once at session
/// teardown. Never a process-wide singleton, so tests run against a fake.
///
/// `write` may accept fewer bytes than offered; the driver retries the
/// remainder. A `write` error is fatal for the session.
pub trait AudioOutput: Send + 'static {
    /// Begins playback; called once before the first write.
    fn start(&mut self) -> Result<()>;

    /// Submits sample bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Halts playback; buffered device-side audio may be discarded.
    fn stop(&mut self) -> Result<()>;

    /// Releases the underlying device. Called exactly once, after `stop`.
    fn release(&mut self);
}
