//! Rover protocol engine.
//!
//! [`ProtocolEngine`] is the single owner of the connection and of every
//! outstanding request. It turns caller operations into wire frames, feeds
//! inbound frames back to whoever is waiting on them, and releases all waiters
//! whenever the link goes down so no caller is left hanging.
//!
//! # Key Components
//!
//! - [`CommandDispatcher`]: the one actuation the rover is executing.
//! - [`ReporterRegistry`]: sensor queries in flight, matched by reporter name.
//! - [`ConnectionManager`]: transport lifecycle and reconnect timer.
//! - [`Rover`]: runs an engine on its own event-loop thread.
//!
//! The engine itself is not thread-safe and never blocks; everything that
//! touches it must happen on one thread, which is what [`Rover`] provides.
mod connection;
mod dispatcher;
mod registry;
mod thread;

use std::{sync::Arc, time::Instant};

use log::{info, trace, warn};
use thiserror::Error;

use crate::{
    config::EngineConfig,
    protocol::{Axis, Emit, Query, Request, Response, Transport, TransportEvent},
};

pub use connection::{ConnectionManager, ConnectionState, Lifecycle, Status};
pub use dispatcher::CommandDispatcher;
pub use registry::ReporterRegistry;
pub use thread::Rover;

/// Continuation invoked exactly once when a request resolves.
pub type Continuation<T> = Box<dyn FnOnce(Result<T, EngineError>) + Send + 'static>;
pub type CommandDone = Continuation<()>;
pub type QueryDone = Continuation<String>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("not connected to the rover")]
    NotConnected,

    #[error("a command is already in progress")]
    CommandBusy,

    #[error("reporter '{0}' already has a pending request")]
    DuplicateRequest(String),

    #[error("rover reported the command as failed")]
    CommandFailed,

    #[error("no reply within the request timeout")]
    Timeout,

    #[error("connection lost before a reply arrived")]
    Disconnected,

    #[error("request cancelled by reset")]
    Reset,

    #[error("request replaced by a newer one")]
    Superseded,

    #[error("engine shut down")]
    Shutdown,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("invalid axis '{0}'")]
    InvalidAxis(String),
}

pub struct ProtocolEngine<T: Transport> {
    connection: ConnectionManager<T>,
    commands: CommandDispatcher,
    reporters: ReporterRegistry,
    reset_on_connect: bool,
}

impl<T: Transport> ProtocolEngine<T> {
    /// Build an engine around `transport`. Transport events must be routed
    /// back through [`ProtocolEngine::handle_transport_event`] by `emit`.
    pub fn new(transport: T, config: &EngineConfig, emit: Arc<Emit>) -> Self {
        Self {
            connection: ConnectionManager::new(transport, emit, config.reconnect_interval),
            commands: CommandDispatcher::new(config.conflict_policy, config.command_timeout),
            reporters: ReporterRegistry::new(config.conflict_policy, config.query_timeout),
            reset_on_connect: config.reset_on_connect,
        }
    }

    pub fn connect(&mut self) {
        self.connection.connect();
    }

    pub fn close(&mut self) {
        if let Some(Lifecycle::Disconnected) = self.connection.close() {
            self.on_disconnected();
        }
    }

    /// Release every waiter and drop the link for good.
    pub fn shutdown(&mut self) {
        info!("shutting down");
        self.connection.close();
        self.cleanup(&EngineError::Shutdown);
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn get_status(&mut self) -> Status {
        self.connection.status()
    }

    pub fn move_forward(&mut self, distance: i32, done: CommandDone) -> Result<(), EngineError> {
        self.actuate(Request::Move(distance), done)
    }

    pub fn move_backward(&mut self, distance: i32, done: CommandDone) -> Result<(), EngineError> {
        self.actuate(Request::Move(distance.saturating_neg()), done)
    }

    pub fn turn_left(&mut self, angle: i32, done: CommandDone) -> Result<(), EngineError> {
        self.actuate(Request::Turn(angle.saturating_neg()), done)
    }

    pub fn turn_right(&mut self, angle: i32, done: CommandDone) -> Result<(), EngineError> {
        self.actuate(Request::Turn(angle), done)
    }

    pub fn detect_artifact(&mut self, done: CommandDone) -> Result<(), EngineError> {
        self.actuate(Request::DetectArtifact, done)
    }

    pub fn query_position(&mut self, axis: Axis, done: QueryDone) -> Result<(), EngineError> {
        self.query(Query::Position(axis), done)
    }

    pub fn query_artifact_id(&mut self, done: QueryDone) -> Result<(), EngineError> {
        self.query(Query::ArtifactId, done)
    }

    pub fn query_artifact_position(
        &mut self,
        axis: Axis,
        done: QueryDone,
    ) -> Result<(), EngineError> {
        self.query(Query::ArtifactPosition(axis), done)
    }

    pub fn query_obstacle_position(
        &mut self,
        id: u32,
        axis: Axis,
        done: QueryDone,
    ) -> Result<(), EngineError> {
        self.query(Query::ObstaclePosition { id, axis }, done)
    }

    pub fn query_ultrasonic_range(&mut self, done: QueryDone) -> Result<(), EngineError> {
        self.query(Query::UltrasonicRange, done)
    }

    /// Submit an actuation. At most one is outstanding at any time; what
    /// happens to a second depends on the configured conflict policy.
    pub fn actuate(&mut self, request: Request, done: CommandDone) -> Result<(), EngineError> {
        if let Err(e) = self.connection.ensure_open() {
            done(Err(e.clone()));
            return Err(e);
        }

        if let Some(request) = self.commands.submit(request, done, Instant::now())? {
            self.transmit(&request);
        }
        Ok(())
    }

    /// Submit a reporter query; its result is matched back by reporter name.
    pub fn query(&mut self, query: Query, done: QueryDone) -> Result<(), EngineError> {
        if let Err(e) = self.connection.ensure_open() {
            done(Err(e.clone()));
            return Err(e);
        }

        let name = query.reporter_name();
        self.reporters.request(&name, done, Instant::now())?;
        self.transmit(&Request::Reporter(name));
        Ok(())
    }

    /// Release every waiter with [`EngineError::Reset`], then tell the rover
    /// to reset.
    pub fn reset_all(&mut self) -> Result<(), EngineError> {
        self.cleanup(&EngineError::Reset);
        self.connection.send(&Request::Reset.to_string())
    }

    pub fn on_message(&mut self, raw: &str) {
        match Response::parse(raw) {
            Response::CommandComplete { success } => {
                if let Some(next) = self.commands.resolve(success, Instant::now()) {
                    self.transmit(&next);
                }
            }
            Response::ReporterResult { name, value } => {
                self.reporters.resolve(&name, value);
            }
            Response::Unknown { raw } => warn!("unrecognized frame: {raw:?}"),
        }
    }

    pub fn on_disconnected(&mut self) {
        self.cleanup(&EngineError::Disconnected);
    }

    pub fn handle_transport_event(&mut self, generation: u64, event: TransportEvent) {
        if let TransportEvent::Message(raw) = &event {
            if self.connection.is_current(generation) && self.state() == ConnectionState::Open {
                self.on_message(raw);
            } else {
                trace!("dropping frame {raw:?} from attempt {generation}");
            }
            return;
        }

        match self.connection.handle(generation, &event, Instant::now()) {
            Some(Lifecycle::Opened) if self.reset_on_connect => {
                if let Err(e) = self.reset_all() {
                    warn!("reset after connect failed: {e}");
                }
            }
            Some(Lifecycle::Opened) => {}
            Some(Lifecycle::Disconnected) => self.on_disconnected(),
            None => {}
        }
    }

    /// Fire every timer that is due: request deadlines and the reconnect.
    pub fn poll_timers(&mut self, now: Instant) {
        trace!("polling timers");
        if let Some(next) = self.commands.expire(now) {
            self.transmit(&next);
        }
        self.reporters.expire(now);
        self.connection.poll(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.commands.next_deadline(),
            self.reporters.next_deadline(),
            self.connection.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn has_pending_command(&self) -> bool {
        self.commands.is_pending()
    }

    pub fn pending_queries(&self) -> usize {
        self.reporters.len()
    }

    fn cleanup(&mut self, reason: &EngineError) {
        let released = self.commands.clear(reason) + self.reporters.clear_all(reason);
        if released > 0 {
            info!("released {released} pending request(s): {reason}");
        }
    }

    fn transmit(&mut self, request: &Request) {
        // A failed send leaves the request pending; the dropped link releases it.
        if let Err(e) = self.connection.send(&request.to_string()) {
            warn!("failed to send {request}: {e}");
        }
    }
}
