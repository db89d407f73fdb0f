//! Connection session: the transport event loop and its state machine.
//!
//! Each external event (open, binary frame, closing handshake, failure) is a
//! message consumed by a single task, so transitions are applied in arrival
//! order and `status` readers observe them atomically through the watch
//! channel. The session task is the only writer to `SessionState` and to the
//! error fields of the shared stats.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::buffer::BufferProducer;
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::transport::{Transport, TransportConn, TransportEvent};
use crate::types::{AudioFrame, SessionState, SharedStats};


/// Close code for a client-initiated shutdown.
const CLOSE_NORMAL: u16 = 1000;
/// Close code when the client is going away (device failure).
const CLOSE_GOING_AWAY: u16 = 1001;
/// Bound on the close handshake during teardown; an unresponsive peer must
/// not block `stop`.
const CLOSE_GRACE: Duration = Duration::from_millis(250);

/// Handles returned by [`ConnectionSession::spawn`].
pub struct SessionChannels {
    /// Receiver for session state transitions.
    pub state: watch::Receiver<SessionState>,
    /// The session task itself.
    pub task: JoinHandle<()>,
}

/// Spawns the receive-path task that owns the transport connection.
pub struct ConnectionSession;

impl ConnectionSession {
    /// Starts the session task.
    ///
    /// The task connects to `config.url`, validates and enqueues binary
    /// frames into `producer`, and applies the reconnection policy on
    /// transport failures. `fault_rx` carries fatal device failures from the
    /// playback driver; `cancel` requests shutdown from the supervisor.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        producer: BufferProducer,
        stats: Arc<SharedStats>,
        cancel: CancellationToken,
        fault_rx: mpsc::Receiver<String>,
    ) -> SessionChannels {
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let task = tokio::spawn(session_task(
            transport, config, producer, stats, cancel, fault_rx, state_tx,
        ));
        SessionChannels { state: state_rx, task }
    }
}

/// How a streaming phase ended.
enum StreamOutcome {
    /// Orderly close; terminal.
    Closed,
    /// Supervisor requested shutdown; terminal.
    Cancelled,
    /// The playback driver lost the device; terminal.
    DeviceFailed(String),
    /// Transport dropped mid-stream; the reconnection policy decides.
    TransportLost(String),
}

async fn session_task(
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    producer: BufferProducer,
    stats: Arc<SharedStats>,
    cancel: CancellationToken,
    mut fault_rx: mpsc::Receiver<String>,
    state_tx: watch::Sender<SessionState>,
) {
    // Sequence numbering continues across reconnects
    let mut seq: u64 = 0;
    let mut attempt: u32 = 0;
    let mut first_connect = true;

    // Dropping `producer` at any return below closes the buffer's write side,
    // which releases the driver into its drain.
    loop {
        if first_connect {
            first_connect = false;
        } else {
            stats.record_reconnect_attempt();
        }
        set_state(&state_tx, SessionState::Connecting);

        let established = tokio::select! {
            _ = cancel.cancelled() => {
                set_state(&state_tx, SessionState::Closed);
                return;
            }
            res = establish(transport.as_ref(), &config) => res,
        };

        let mut conn = match established {
            Ok(conn) => conn,
            Err(e) => {
                if attempt >= config.reconnect.max_attempts {
                    fail(
                        &state_tx,
                        &stats,
                        format!("connect failed after {attempt} reconnection attempts: {e}"),
                    );
                    return;
                }
                // Non-terminal failure: the reason is visible through
                // `status` for the whole backoff window.
                set_state(&state_tx, SessionState::Failed(format!("connect failed: {e}")));
                let delay = config.reconnect.delay(attempt);
                attempt += 1;
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "connect failed, backing off: {e}"
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        set_state(&state_tx, SessionState::Closed);
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }
        };

        // Each outage gets the full retry budget
        attempt = 0;
        info!(url = %config.url, "streaming");
        set_state(&state_tx, SessionState::Streaming);

        let outcome = streaming_loop(
            conn.as_mut(),
            &producer,
            &config,
            &stats,
            &state_tx,
            &cancel,
            &mut fault_rx,
            &mut seq,
        )
        .await;

        match outcome {
            StreamOutcome::Closed => {
                set_state(&state_tx, SessionState::Closed);
                return;
            }
            StreamOutcome::Cancelled => {
                let _ = timeout(CLOSE_GRACE, conn.close(CLOSE_NORMAL, "client stop")).await;
                set_state(&state_tx, SessionState::Closed);
                return;
            }
            StreamOutcome::DeviceFailed(reason) => {
                let _ = timeout(CLOSE_GRACE, conn.close(CLOSE_GOING_AWAY, "device failure")).await;
                fail(&state_tx, &stats, format!("audio device failure: {reason}"));
                return;
            }
            StreamOutcome::TransportLost(reason) => {
                warn!("transport lost: {reason}");
                set_state(&state_tx, SessionState::Failed(format!("transport lost: {reason}")));
                // Back to Connecting
            }
        }
    }
}

/// Opens the transport and waits for its open confirmation, both bounded by
/// the connect timeout.
async fn establish(
    transport: &dyn Transport,
    config: &SessionConfig,
) -> Result<Box<dyn TransportConn>> {
    let connect_timeout = config.connect_timeout();
    let mut conn = timeout(connect_timeout, transport.open(&config.url))
        .await
        .map_err(|_| SessionError::Timeout { duration: connect_timeout })??;

    match timeout(connect_timeout, conn.next_event()).await {
        Ok(Some(TransportEvent::Opened)) => Ok(conn),
        Ok(Some(TransportEvent::Error(reason))) => Err(SessionError::transport_failed(reason)),
        Ok(Some(TransportEvent::Closing { .. } | TransportEvent::Closed { .. })) | Ok(None) => {
            Err(SessionError::transport_failed("connection closed during handshake"))
        }
        Ok(Some(TransportEvent::Binary(_))) => {
            Err(SessionError::transport_failed("binary frame before open confirmation"))
        }
        Err(_) => Err(SessionError::Timeout { duration: connect_timeout }),
    }
}

/// Streaming phase: consume events until the connection ends one way or
/// another.
#[allow(clippy::too_many_arguments)]
async fn streaming_loop(
    conn: &mut dyn TransportConn,
    producer: &BufferProducer,
    config: &SessionConfig,
    stats: &SharedStats,
    state_tx: &watch::Sender<SessionState>,
    cancel: &CancellationToken,
    fault_rx: &mut mpsc::Receiver<String>,
    seq: &mut u64,
) -> StreamOutcome {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return StreamOutcome::Cancelled,
            Some(reason) = fault_rx.recv() => return StreamOutcome::DeviceFailed(reason),
            event = conn.next_event() => match event {
                Some(TransportEvent::Binary(payload)) => {
                    let frame = AudioFrame { seq: *seq, payload };
                    *seq += 1;
                    stats.record_frame_received();

                    match validate_frame(&frame, config.max_frame_bytes) {
                        Ok(()) => {
                            // An overrun here is already counted by the ring
                            let _ = producer.push(&frame.payload);
                            stats.record_frame_enqueued();
                        }
                        Err(e) => {
                            stats.record_malformed_frame();
                            debug!(seq = frame.seq, "dropped frame: {e}");
                        }
                    }
                }
                Some(TransportEvent::Closing { code, reason }) => {
                    return drain_close(conn, config, state_tx, cancel, code, reason).await;
                }
                Some(TransportEvent::Closed { code, reason }) => {
                    info!(code, reason, "transport closed");
                    return StreamOutcome::Closed;
                }
                Some(TransportEvent::Error(reason)) => {
                    return StreamOutcome::TransportLost(reason);
                }
                // Duplicate open confirmations are harmless
                Some(TransportEvent::Opened) => {}
                None => {
                    return StreamOutcome::TransportLost("connection ended unexpectedly".into());
                }
            }
        }
    }
}

/// Peer started the closing handshake: acknowledge, then wait for the close
/// ack or the drain timeout.
async fn drain_close(
    conn: &mut dyn TransportConn,
    config: &SessionConfig,
    state_tx: &watch::Sender<SessionState>,
    cancel: &CancellationToken,
    code: u16,
    reason: String,
) -> StreamOutcome {
    debug!(code, reason, "peer closing, draining");
    set_state(state_tx, SessionState::Draining);
    let _ = timeout(CLOSE_GRACE, conn.close(CLOSE_NORMAL, "close ack")).await;

    let deadline = tokio::time::sleep(config.drain_timeout());
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return StreamOutcome::Cancelled,
            _ = &mut deadline => {
                debug!("drain timeout before close ack");
                return StreamOutcome::Closed;
            }
            event = conn.next_event() => match event {
                Some(TransportEvent::Closed { code, reason }) => {
                    info!(code, reason, "transport closed");
                    return StreamOutcome::Closed;
                }
                Some(TransportEvent::Error(e)) => {
                    debug!("error during close handshake: {e}");
                    return StreamOutcome::Closed;
                }
                None => return StreamOutcome::Closed,
                // Late frames after the closing handshake are dropped
                Some(other) => debug!(?other, "ignoring event while draining"),
            }
        }
    }
}

fn validate_frame(frame: &AudioFrame, max_frame_bytes: usize) -> Result<()> {
    if frame.payload.is_empty() {
        return Err(SessionError::malformed_frame("empty payload"));
    }
    if frame.payload.len() > max_frame_bytes {
        return Err(SessionError::malformed_frame(format!(
            "{} bytes exceeds limit of {max_frame_bytes}",
            frame.payload.len()
        )));
    }
    Ok(())
}

fn set_state(state_tx: &watch::Sender<SessionState>, next: SessionState) {
    debug!(state = %next, "session state");
    let _ = state_tx.send(next);
}

/// Terminal failure: no error is silently swallowed, the reason lands in both
/// the state and the stats.
fn fail(state_tx: &watch::Sender<SessionState>, stats: &SharedStats, reason: String) {
    warn!("session failed: {reason}");
    stats.set_last_error(reason.clone());
    set_state(state_tx, SessionState::Failed(reason));
}
