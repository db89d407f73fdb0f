//! Session supervisor: the public API surface of the core.
//!
//! `start` sizes the ring from config, wires the session and driver tasks,
//! and initiates the connection; the returned handle exposes `stop` and
//! `status`. A finished session is never restarted; callers construct a new
//! one.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::buffer::FrameBuffer;
use crate::config::{SessionConfig, StopOptions};
use crate::device::AudioOutput;
use crate::driver::{DriverConfig, PlaybackDriver};
use crate::error::Result;
use crate::session::ConnectionSession;
use crate::transport::Transport;
use crate::types::{SessionState, SharedStats, StatsSnapshot};

/// Slack on top of stop budgets before teardown is forced.
const STOP_SLACK: Duration = Duration::from_millis(250);

/// Combined state and counters returned by [`SessionHandle::status`].
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: SessionState,
    pub stats: StatsSnapshot,
}

/// Constructs and wires a playback session.
pub struct SessionSupervisor;

impl SessionSupervisor {
    /// Starts a session: connect to `config.url` through `transport` and
    /// play received audio into `device`.
    ///
    /// Returns once the session task is live (it publishes `Connecting`
    /// immediately); the connection itself completes in the background and
    /// progress is observable through [`SessionHandle::status`].
    pub async fn start(
        transport: Arc<dyn Transport>,
        device: Box<dyn AudioOutput>,
        config: SessionConfig,
    ) -> Result<SessionHandle> {
        config.validate()?;

        let stats = Arc::new(SharedStats::default());
        let (producer, consumer) =
            FrameBuffer::new(config.buffer_capacity(), Arc::clone(&stats)).split();

        let session_cancel = CancellationToken::new();
        let hard_cancel = CancellationToken::new();
        let (drain_tx, drain_rx) = watch::channel(None);
        let (fault_tx, fault_rx) = mpsc::channel(1);

        let driver_task = PlaybackDriver::spawn(
            consumer,
            device,
            DriverConfig::from_session(&config),
            Arc::clone(&stats),
            hard_cancel.clone(),
            drain_rx,
            fault_tx,
        );

        let url = config.url.clone();
        let channels = ConnectionSession::spawn(
            transport,
            config,
            producer,
            Arc::clone(&stats),
            session_cancel.clone(),
            fault_rx,
        );

        // Surface the first transition out of Idle before returning so
        // callers never observe a handle for a session that has not started.
        let mut state_rx = channels.state.clone();
        let _ = timeout(Duration::from_secs(1), async {
            while matches!(*state_rx.borrow(), SessionState::Idle) {
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;

        info!(url = %url, "session started");

        Ok(SessionHandle {
            state: channels.state,
            stats,
            drain: drain_tx,
            session_cancel,
            hard_cancel,
            tasks: Mutex::new(Some(SessionTasks { session: channels.task, driver: driver_task })),
        })
    }
}

struct SessionTasks {
    session: JoinHandle<()>,
    driver: JoinHandle<()>,
}

/// Handle to a running (or finished) playback session.
pub struct SessionHandle {
    state: watch::Receiver<SessionState>,
    stats: Arc<SharedStats>,
    drain: watch::Sender<Option<Duration>>,
    session_cancel: CancellationToken,
    hard_cancel: CancellationToken,
    tasks: Mutex<Option<SessionTasks>>,
}

impl SessionHandle {
    /// Wait-free snapshot of the session state and playback counters.
    pub fn status(&self) -> SessionStatus {
        SessionStatus { state: self.state.borrow().clone(), stats: self.stats.snapshot() }
    }

    /// Stream of state transitions, starting with the current state.
    pub fn state_updates(&self) -> impl Stream<Item = SessionState> + 'static {
        WatchStream::new(self.state.clone())
    }

    /// Requests graceful shutdown: the driver plays buffered audio up to the
    /// drain budget, then the device is stopped and released.
    ///
    /// Bounded even against an unresponsive transport, and idempotent:
    /// calling `stop` on an already-stopped session is a no-op that returns
    /// the settled terminal state.
    pub async fn stop(&self, options: StopOptions) -> SessionState {
        let budget = options.drain_timeout();
        // Hand the driver its drain budget before stopping the receive path
        let _ = self.drain.send(Some(budget));
        self.session_cancel.cancel();

        let tasks = self.tasks.lock().expect("handle mutex poisoned").take();
        match tasks {
            Some(SessionTasks { session, driver }) => {
                let mut driver = driver;
                if timeout(budget + STOP_SLACK, &mut driver).await.is_err() {
                    debug!("drain budget exceeded, forcing teardown");
                    self.hard_cancel.cancel();
                    let _ = timeout(STOP_SLACK, &mut driver).await;
                }

                let mut session = session;
                if timeout(STOP_SLACK, &mut session).await.is_err() {
                    debug!("session task unresponsive at stop, aborting");
                    session.abort();
                }
            }
            None => {
                // Another stop is (or was) tearing the session down; wait for
                // it to settle so both callers observe the terminal state.
                debug!("stop on an already-stopping session");
                let mut state = self.state.clone();
                let _ = timeout(budget + STOP_SLACK, async {
                    while !state.borrow_and_update().is_terminal() {
                        if state.changed().await.is_err() {
                            break;
                        }
                    }
                })
                .await;
            }
        }

        self.state.borrow().clone()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        debug!("dropping session handle");
        // Cancel tasks on drop for clean shutdown
        self.session_cancel.cancel();
        self.hard_cancel.cancel();
    }
}
