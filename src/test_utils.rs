//! Scripted fakes for exercising the pipeline without a network or a sound
//! card.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::device::AudioOutput;
use crate::error::{Result, SessionError};
use crate::transport::{Transport, TransportConn, TransportEvent};

/// One scripted connection attempt.
pub enum ConnScript {
    /// `open` fails outright with this reason.
    Refuse(&'static str),
    /// `open` succeeds and the connection replays these events, then ends.
    Events(Vec<ScriptedEvent>),
    /// `open` succeeds, replays events, then hangs until cancelled. Models an
    /// unresponsive peer.
    EventsThenHang(Vec<ScriptedEvent>),
}

pub struct ScriptedEvent {
    pub after: Duration,
    pub event: TransportEvent,
}

impl ScriptedEvent {
    pub fn now(event: TransportEvent) -> Self {
        Self { after: Duration::ZERO, event }
    }

    pub fn delayed(after: Duration, event: TransportEvent) -> Self {
        Self { after, event }
    }
}

/// Transport whose connection attempts replay a fixed script, recording when
/// each `open` happened (in virtual time under a paused runtime) and which
/// close calls the session issued.
pub struct ScriptedTransport {
    attempts: Mutex<VecDeque<ConnScript>>,
    opens: Mutex<Vec<Instant>>,
    closes: Arc<Mutex<Vec<(u16, String)>>>,
}

impl ScriptedTransport {
    pub fn new(attempts: Vec<ConnScript>) -> Arc<Self> {
        Arc::new(Self {
            attempts: Mutex::new(attempts.into()),
            opens: Mutex::new(Vec::new()),
            closes: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// A transport that opens once and streams the given binary payloads.
    pub fn streaming(payloads: Vec<Vec<u8>>) -> Arc<Self> {
        let mut events = vec![ScriptedEvent::now(TransportEvent::Opened)];
        events.extend(
            payloads.into_iter().map(|p| ScriptedEvent::now(TransportEvent::Binary(p.into()))),
        );
        Self::new(vec![ConnScript::EventsThenHang(events)])
    }

    pub fn open_instants(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> Vec<(u16, String)> {
        self.closes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, _url: &str) -> Result<Box<dyn TransportConn>> {
        self.opens.lock().unwrap().push(Instant::now());
        let script = self.attempts.lock().unwrap().pop_front();
        match script {
            None => Err(SessionError::transport_failed("script exhausted")),
            Some(ConnScript::Refuse(reason)) => Err(SessionError::transport_failed(reason)),
            Some(ConnScript::Events(events)) => Ok(Box::new(ScriptedConn {
                events: events.into(),
                hang: false,
                closes: Arc::clone(&self.closes),
            })),
            Some(ConnScript::EventsThenHang(events)) => Ok(Box::new(ScriptedConn {
                events: events.into(),
                hang: true,
                closes: Arc::clone(&self.closes),
            })),
        }
    }
}

struct ScriptedConn {
    events: VecDeque<ScriptedEvent>,
    hang: bool,
    closes: Arc<Mutex<Vec<(u16, String)>>>,
}

#[async_trait]
impl TransportConn for ScriptedConn {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        match self.events.pop_front() {
            Some(scripted) => {
                if !scripted.after.is_zero() {
                    tokio::time::sleep(scripted.after).await;
                }
                Some(scripted.event)
            }
            None if self.hang => futures::future::pending().await,
            None => None,
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.closes.lock().unwrap().push((code, reason.to_string()));
        Ok(())
    }
}

/// What a [`FakeDevice`] observed.
#[derive(Debug, Default)]
pub struct DeviceLog {
    pub written: Vec<u8>,
    pub starts: u32,
    pub stops: u32,
    pub releases: u32,
}

/// Audio output that records everything written to it.
pub struct FakeDevice {
    log: Arc<Mutex<DeviceLog>>,
    accept_at_most: Option<usize>,
    fail_writes: bool,
}

impl FakeDevice {
    pub fn new() -> (Self, Arc<Mutex<DeviceLog>>) {
        let log = Arc::new(Mutex::new(DeviceLog::default()));
        (Self { log: Arc::clone(&log), accept_at_most: None, fail_writes: false }, log)
    }

    /// Accept at most `n` bytes per write call, forcing short-write retries.
    pub fn with_short_writes(mut self, n: usize) -> Self {
        self.accept_at_most = Some(n);
        self
    }

    /// Every write fails, modelling a vanished output device.
    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }
}

impl AudioOutput for FakeDevice {
    fn start(&mut self) -> Result<()> {
        self.log.lock().unwrap().starts += 1;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.fail_writes {
            return Err(SessionError::device_failed("scripted write failure"));
        }
        let n = self.accept_at_most.map_or(data.len(), |m| m.min(data.len()));
        self.log.lock().unwrap().written.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn stop(&mut self) -> Result<()> {
        self.log.lock().unwrap().stops += 1;
        Ok(())
    }

    fn release(&mut self) {
        self.log.lock().unwrap().releases += 1;
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}
