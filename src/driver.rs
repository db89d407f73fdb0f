//! Playback driver: steady-rate delivery to the audio device.
//!
//! The driver is a periodic task that pulls one chunk per tick from the ring
//! and forwards it to the device, padding shortfalls with silence so the
//! device always sees a continuous stream regardless of network jitter.
//! Repeated underrun is reported as degraded playback, never as a failure;
//! only a device error ends the session.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::buffer::BufferConsumer;
use crate::config::SessionConfig;
use crate::device::AudioOutput;
use crate::types::SharedStats;

/// Consecutive zero-byte writes before the device is declared wedged.
const MAX_WRITE_STALLS: u32 = 64;
const WRITE_STALL_BACKOFF: Duration = Duration::from_millis(1);

/// Pacing parameters derived from the session config.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Bytes pulled per tick.
    pub chunk_bytes: usize,
    /// Tick period; chunk_bytes covers exactly this much audio.
    pub chunk_period: Duration,
    /// Interleaved sample-block size; writes never split a block.
    pub block_size: usize,
    /// Pad byte representing silence for the configured format.
    pub silence: u8,
    /// Consecutive short pulls before degraded playback is reported.
    pub underrun_tolerance: u32,
    /// Drain budget when teardown does not supply one.
    pub drain_timeout: Duration,
}

impl DriverConfig {
    pub fn from_session(config: &SessionConfig) -> Self {
        Self {
            chunk_bytes: config.chunk_bytes(),
            chunk_period: config.chunk_period(),
            block_size: config.audio.block_size(),
            silence: config.audio.format.silence_byte(),
            underrun_tolerance: config.underrun_tolerance,
            drain_timeout: config.drain_timeout(),
        }
    }
}

/// Spawns the pacing task.
pub struct PlaybackDriver;

impl PlaybackDriver {
    /// Starts the pacing loop on its own task.
    ///
    /// `drain_rx` delivers a drain budget when the supervisor stops the
    /// session; the driver also begins draining on its own once the producer
    /// side closes. `cancel` is the hard stop: no drain, immediate teardown.
    /// A fatal device failure is sent through `fault_tx` so the session can
    /// transition to `Failed`.
    pub fn spawn(
        consumer: BufferConsumer,
        device: Box<dyn AudioOutput>,
        config: DriverConfig,
        stats: Arc<SharedStats>,
        cancel: CancellationToken,
        drain_rx: watch::Receiver<Option<Duration>>,
        fault_tx: mpsc::Sender<String>,
    ) -> JoinHandle<()> {
        tokio::spawn(pace_task(consumer, device, config, stats, cancel, drain_rx, fault_tx))
    }
}

async fn pace_task(
    consumer: BufferConsumer,
    mut device: Box<dyn AudioOutput>,
    config: DriverConfig,
    stats: Arc<SharedStats>,
    cancel: CancellationToken,
    mut drain_rx: watch::Receiver<Option<Duration>>,
    fault_tx: mpsc::Sender<String>,
) {
    debug!(
        chunk_bytes = config.chunk_bytes,
        period_ms = config.chunk_period.as_millis() as u64,
        "playback driver started"
    );

    let fatal = match device.start() {
        Ok(()) => {
            run_loop(&consumer, device.as_mut(), &config, &stats, &cancel, &mut drain_rx).await
        }
        Err(e) => Some(format!("device start failed: {e}")),
    };

    // Single teardown path: release exactly once.
    if let Err(e) = device.stop() {
        debug!("device stop failed: {e}");
    }
    device.release();

    if let Some(reason) = fatal {
        error!("audio device failure: {reason}");
        stats.set_last_error(&reason);
        let _ = fault_tx.try_send(reason);
    } else {
        debug!("playback driver stopped");
    }
}

/// Pacing loop proper. Returns `Some(reason)` on fatal device failure.
async fn run_loop(
    consumer: &BufferConsumer,
    device: &mut dyn AudioOutput,
    config: &DriverConfig,
    stats: &SharedStats,
    cancel: &CancellationToken,
    drain_rx: &mut watch::Receiver<Option<Duration>>,
) -> Option<String> {
    let mut interval = tokio::time::interval(config.chunk_period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut consecutive_short = 0u32;
    let mut played_any = false;
    let mut stalls = 0u32;
    let mut drain_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("playback cancelled");
                return None;
            }
            res = drain_rx.changed(), if drain_deadline.is_none() => {
                let budget = match res {
                    Ok(()) => (*drain_rx.borrow_and_update()).unwrap_or(config.drain_timeout),
                    // Supervisor gone; fall back to the configured budget
                    Err(_) => config.drain_timeout,
                };
                drain_deadline = Some(Instant::now() + budget);
                debug!(budget_ms = budget.as_millis() as u64, "drain requested");
                continue;
            }
            _ = interval.tick() => {}
        }

        // Producer closed without an explicit drain command: session ended on
        // its own, play out what remains.
        if drain_deadline.is_none() && consumer.is_closed() {
            drain_deadline = Some(Instant::now() + config.drain_timeout);
            debug!("producer closed, draining remaining audio");
        }

        if let Some(deadline) = drain_deadline {
            let buffered = consumer.buffered();
            if buffered == 0 {
                debug!("drain complete");
                return None;
            }
            if Instant::now() >= deadline {
                warn!(bytes_discarded = buffered, "drain deadline reached");
                return None;
            }
        }

        let draining = drain_deadline.is_some();
        let mut chunk = consumer.pull(config.chunk_bytes);
        let shortfall = config.chunk_bytes - chunk.len();

        if !chunk.is_empty() {
            played_any = true;
        }

        if shortfall == 0 {
            consecutive_short = 0;
            stats.set_degraded(false);
        } else if !draining && played_any {
            stats.record_underrun();
            consecutive_short += 1;
            if consecutive_short == config.underrun_tolerance {
                stats.set_degraded(true);
                warn!(consecutive = consecutive_short, "repeated underrun, playback degraded");
            }
        }

        if draining {
            // Pad only to a whole sample block; drain ends with real audio
            let rem = chunk.len() % config.block_size;
            if rem != 0 {
                let target = chunk.len() + config.block_size - rem;
                chunk.resize(target, config.silence);
            }
        } else if shortfall > 0 {
            chunk.resize(config.chunk_bytes, config.silence);
        }

        // Forward to the device, retrying short writes until the chunk is
        // fully accepted.
        let mut offset = 0;
        while offset < chunk.len() {
            if cancel.is_cancelled() {
                return None;
            }
            match device.write(&chunk[offset..]) {
                Ok(0) => {
                    stalls += 1;
                    if stalls >= MAX_WRITE_STALLS {
                        return Some("device stopped accepting audio".to_string());
                    }
                    tokio::time::sleep(WRITE_STALL_BACKOFF).await;
                }
                Ok(n) => {
                    stalls = 0;
                    offset += n;
                    stats.record_bytes_played(n as u64);
                }
                Err(e) => return Some(e.to_string()),
            }
        }
    }
}
