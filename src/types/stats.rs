//! Playback statistics shared between the receive path, the pacing loop, and
//! `status` readers.
//!
//! Counters are relaxed atomics: each is independently monotonic, and status
//! queries need a cheap snapshot, not a cross-counter consistent cut.

use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Live counters mutated by the driver and session tasks.
#[derive(Debug, Default)]
pub struct SharedStats {
    bytes_played: AtomicU64,
    underruns: AtomicU64,
    overruns: AtomicU64,
    malformed_frames: AtomicU64,
    frames_received: AtomicU64,
    frames_enqueued: AtomicU64,
    reconnect_attempts: AtomicU64,
    degraded: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl SharedStats {
    pub fn record_bytes_played(&self, n: u64) {
        self.bytes_played.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_enqueued(&self) {
        self.frames_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_degraded(&self, degraded: bool) {
        self.degraded.store(degraded, Ordering::Relaxed);
    }

    pub fn set_last_error(&self, reason: impl Into<String>) {
        let mut slot = self.last_error.lock().expect("stats mutex poisoned");
        *slot = Some(reason.into());
    }

    /// Read-only snapshot for status queries.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_played: self.bytes_played.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_enqueued: self.frames_enqueued.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            last_error: self.last_error.lock().expect("stats mutex poisoned").clone(),
        }
    }
}

/// Point-in-time view of [`SharedStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub bytes_played: u64,
    pub underruns: u64,
    pub overruns: u64,
    pub malformed_frames: u64,
    pub frames_received: u64,
    pub frames_enqueued: u64,
    pub reconnect_attempts: u64,
    pub degraded: bool,
    pub last_error: Option<String>,
}
