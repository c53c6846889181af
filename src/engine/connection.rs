use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use crate::protocol::{Emit, Transport, TransportEvent, TransportSink};

use super::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Answer to a status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ready,
    NotConnected,
}

/// Connection transitions the engine has to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Opened,
    Disconnected,
}

/// Owns the transport and its reconnect timer.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    state: ConnectionState,
    generation: u64,
    emit: Arc<Emit>,
    reconnect_interval: Duration,
    reconnect_at: Option<Instant>,
    auto_reconnect: bool,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, emit: Arc<Emit>, reconnect_interval: Duration) -> Self {
        Self {
            transport,
            state: ConnectionState::Closed,
            generation: 0,
            emit,
            reconnect_interval,
            reconnect_at: None,
            auto_reconnect: true,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Start connecting unless already open or on the way there.
    pub fn connect(&mut self) {
        self.auto_reconnect = true;
        self.attempt();
    }

    fn attempt(&mut self) {
        if matches!(self.state, ConnectionState::Open | ConnectionState::Connecting) {
            return;
        }

        self.generation += 1;
        self.state = ConnectionState::Connecting;
        self.reconnect_at = None;
        info!("connecting (attempt {})", self.generation);

        let sink = TransportSink::new(self.generation, Arc::clone(&self.emit));
        if let Err(e) = self.transport.connect(sink) {
            warn!("connect attempt {} failed: {e}", self.generation);
            self.state = ConnectionState::Closed;
            self.schedule_reconnect(Instant::now());
        }
    }

    /// Apply a lifecycle event from the transport.
    ///
    /// Events from earlier connect attempts are dropped.
    pub fn handle(
        &mut self,
        generation: u64,
        event: &TransportEvent,
        now: Instant,
    ) -> Option<Lifecycle> {
        if !self.is_current(generation) {
            debug!("dropping {event:?} from stale attempt {generation}");
            return None;
        }

        match event {
            TransportEvent::Open => match self.state {
                ConnectionState::Connecting => {
                    info!("connection open");
                    self.state = ConnectionState::Open;
                    self.reconnect_at = None;
                    Some(Lifecycle::Opened)
                }
                ConnectionState::Closing => {
                    self.transport.close();
                    None
                }
                _ => None,
            },
            TransportEvent::Error(_) | TransportEvent::Close => {
                if self.state == ConnectionState::Closed {
                    return None;
                }

                match event {
                    TransportEvent::Error(e) => warn!("connection error: {e}"),
                    _ => info!("connection closed"),
                }
                self.state = ConnectionState::Closed;
                self.schedule_reconnect(now);
                Some(Lifecycle::Disconnected)
            }
            TransportEvent::Message(_) => None,
        }
    }

    pub fn ensure_open(&self) -> Result<(), EngineError> {
        match self.state {
            ConnectionState::Open => Ok(()),
            _ => Err(EngineError::NotConnected),
        }
    }

    pub fn send(&mut self, frame: &str) -> Result<(), EngineError> {
        self.ensure_open()?;

        debug!("sending {frame:?}");
        self.transport.send(frame).map_err(|e| {
            // Force the link down so pending requests are released by cleanup.
            self.transport.close();
            EngineError::Transport(e.to_string())
        })
    }

    /// Close on request. Returns `Disconnected` if the link was live.
    pub fn close(&mut self) -> Option<Lifecycle> {
        self.auto_reconnect = false;
        self.reconnect_at = None;

        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                info!("closing connection");
                self.state = ConnectionState::Closing;
                self.transport.close();
                Some(Lifecycle::Disconnected)
            }
            _ => None,
        }
    }

    /// Report readiness, kicking off a reconnect if the link is down.
    pub fn status(&mut self) -> Status {
        match self.state {
            ConnectionState::Open => Status::Ready,
            ConnectionState::Closed if self.auto_reconnect => {
                self.attempt();
                Status::NotConnected
            }
            _ => Status::NotConnected,
        }
    }

    pub fn poll(&mut self, now: Instant) {
        if self.reconnect_at.is_some_and(|at| at <= now) {
            self.reconnect_at = None;
            self.attempt();
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        if !self.auto_reconnect {
            return;
        }
        info!("reconnecting in {:?}", self.reconnect_interval);
        self.reconnect_at = now.checked_add(self.reconnect_interval);
    }
}
