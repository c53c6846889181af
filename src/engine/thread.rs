use std::{
    sync::{
        Arc,
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    thread,
    time::Instant,
};

use log::{debug, error};

use crate::{
    config::EngineConfig,
    protocol::{Axis, Emit, TcpTransport, Transport, TransportError, TransportEvent},
};

use super::{EngineError, ProtocolEngine, Status};

/// Work run against the engine on its own thread; `Err` means the loop is gone.
type Job<T> = Box<dyn FnOnce(Result<&mut ProtocolEngine<T>, EngineError>) + Send + 'static>;

enum Event<T: Transport> {
    Transport(u64, TransportEvent),
    Call(Job<T>),
    Shutdown,
}

/// Handle to a [`ProtocolEngine`] running on a dedicated event-loop thread.
///
/// Caller operations, transport events and timers are all serialized through
/// one channel, so the engine never needs a lock. Continuations run on the
/// loop thread and must not block it.
pub struct Rover<T: Transport + 'static = TcpTransport> {
    sender: Sender<Event<T>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Rover<TcpTransport> {
    /// Resolve the configured address and start talking TCP to it.
    pub fn connect(config: EngineConfig) -> Result<Self, TransportError> {
        let address = config.address()?;
        Self::spawn(TcpTransport::new(address), config)
    }
}

impl<T: Transport + 'static> Rover<T> {
    pub fn spawn(transport: T, config: EngineConfig) -> Result<Self, TransportError> {
        let (sender, receiver) = mpsc::channel();

        let events = sender.clone();
        let emit: Arc<Emit> = Arc::new(move |generation: u64, event: TransportEvent| {
            let _ = events.send(Event::Transport(generation, event));
        });

        let thread = thread::Builder::new()
            .name("rover-engine".to_string())
            .spawn(move || {
                let mut engine = ProtocolEngine::new(transport, &config, emit);
                engine.connect();
                run(engine, receiver);
            })?;

        Ok(Self {
            sender,
            thread: Some(thread),
        })
    }

    pub fn move_forward<F>(&self, distance: i32, done: F)
    where
        F: FnOnce(Result<(), EngineError>) + Send + 'static,
    {
        self.submit(done, move |engine, done| engine.move_forward(distance, done));
    }

    pub fn move_backward<F>(&self, distance: i32, done: F)
    where
        F: FnOnce(Result<(), EngineError>) + Send + 'static,
    {
        self.submit(done, move |engine, done| engine.move_backward(distance, done));
    }

    pub fn turn_left<F>(&self, angle: i32, done: F)
    where
        F: FnOnce(Result<(), EngineError>) + Send + 'static,
    {
        self.submit(done, move |engine, done| engine.turn_left(angle, done));
    }

    pub fn turn_right<F>(&self, angle: i32, done: F)
    where
        F: FnOnce(Result<(), EngineError>) + Send + 'static,
    {
        self.submit(done, move |engine, done| engine.turn_right(angle, done));
    }

    pub fn detect_artifact<F>(&self, done: F)
    where
        F: FnOnce(Result<(), EngineError>) + Send + 'static,
    {
        self.submit(done, |engine, done| engine.detect_artifact(done));
    }

    pub fn query_position<F>(&self, axis: Axis, done: F)
    where
        F: FnOnce(Result<String, EngineError>) + Send + 'static,
    {
        self.submit(done, move |engine, done| engine.query_position(axis, done));
    }

    pub fn query_artifact_id<F>(&self, done: F)
    where
        F: FnOnce(Result<String, EngineError>) + Send + 'static,
    {
        self.submit(done, |engine, done| engine.query_artifact_id(done));
    }

    pub fn query_artifact_position<F>(&self, axis: Axis, done: F)
    where
        F: FnOnce(Result<String, EngineError>) + Send + 'static,
    {
        self.submit(done, move |engine, done| {
            engine.query_artifact_position(axis, done)
        });
    }

    pub fn query_obstacle_position<F>(&self, id: u32, axis: Axis, done: F)
    where
        F: FnOnce(Result<String, EngineError>) + Send + 'static,
    {
        self.submit(done, move |engine, done| {
            engine.query_obstacle_position(id, axis, done)
        });
    }

    pub fn query_ultrasonic_range<F>(&self, done: F)
    where
        F: FnOnce(Result<String, EngineError>) + Send + 'static,
    {
        self.submit(done, |engine, done| engine.query_ultrasonic_range(done));
    }

    /// Release every pending request and reset the rover.
    pub fn reset_all(&self) -> Result<(), EngineError> {
        self.request(|engine| engine.reset_all())?
    }

    /// Current link status; polling while disconnected triggers a reconnect.
    pub fn get_status(&self) -> Status {
        self.request(|engine| engine.get_status())
            .unwrap_or(Status::NotConnected)
    }

    pub fn close(&self) {
        self.execute(|engine| {
            if let Ok(engine) = engine {
                engine.close();
            }
        });
    }

    /// Re-open the link after [`Rover::close`], re-enabling auto-reconnect.
    pub fn reconnect(&self) {
        self.execute(|engine| {
            if let Ok(engine) = engine {
                engine.connect();
            }
        });
    }

    /// Stop the loop, releasing every pending request with `Shutdown`.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn execute<F>(&self, job: F)
    where
        F: FnOnce(Result<&mut ProtocolEngine<T>, EngineError>) + Send + 'static,
    {
        let sent = self.sender.send(Event::Call(Box::new(job)));
        if let Err(mpsc::SendError(Event::Call(job))) = sent {
            job(Err(EngineError::Shutdown));
        }
    }

    /// Run a submission on the loop; the continuation hears about rejections
    /// from the engine, or `Shutdown` if the loop has already stopped.
    fn submit<R, F, S>(&self, done: F, op: S)
    where
        R: 'static,
        F: FnOnce(Result<R, EngineError>) + Send + 'static,
        S: FnOnce(&mut ProtocolEngine<T>, super::Continuation<R>) -> Result<(), EngineError>
            + Send
            + 'static,
    {
        self.execute(move |engine| match engine {
            Ok(engine) => {
                let _ = op(engine, Box::new(done));
            }
            Err(e) => done(Err(e)),
        });
    }

    /// Run `f` on the loop and wait for its answer.
    fn request<R, F>(&self, f: F) -> Result<R, EngineError>
    where
        R: Send + 'static,
        F: FnOnce(&mut ProtocolEngine<T>) -> R + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.execute(move |engine| {
            let _ = tx.send(engine.map(f));
        });
        rx.recv().map_err(|_| EngineError::Shutdown)?
    }

    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.sender.send(Event::Shutdown);
            if thread.join().is_err() {
                error!("engine thread panicked");
            }
        }
    }
}

impl<T: Transport + 'static> Drop for Rover<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<T: Transport>(mut engine: ProtocolEngine<T>, receiver: Receiver<Event<T>>) {
    loop {
        let event = match engine.next_deadline() {
            Some(deadline) => {
                match receiver.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok(event) => event,
                    Err(RecvTimeoutError::Timeout) => {
                        engine.poll_timers(Instant::now());
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match receiver.recv() {
                Ok(event) => event,
                Err(_) => break,
            },
        };

        match event {
            Event::Transport(generation, event) => engine.handle_transport_event(generation, event),
            Event::Call(job) => job(Ok(&mut engine)),
            Event::Shutdown => break,
        }
        engine.poll_timers(Instant::now());
    }

    debug!("engine loop stopping");
    engine.shutdown();

    for event in receiver.try_iter() {
        if let Event::Call(job) = event {
            job(Err(EngineError::Shutdown));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::protocol::mock::MockTransport;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn calls_run_on_the_loop() {
        let transport = MockTransport::default();
        let rover = Rover::spawn(transport.clone(), EngineConfig::default()).unwrap();

        assert_eq!(rover.get_status(), Status::NotConnected);
        assert_eq!(transport.connects(), 1);

        let (tx, rx) = mpsc::channel();
        rover.move_forward(100, move |result| tx.send(result).unwrap());
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Err(EngineError::NotConnected));
    }

    #[test]
    fn reconnect_after_close() {
        let transport = MockTransport::default();
        let rover = Rover::spawn(transport.clone(), EngineConfig::default()).unwrap();

        rover.close();
        assert_eq!(rover.get_status(), Status::NotConnected);
        assert_eq!(transport.connects(), 1);
        assert_eq!(transport.closes(), 1);

        rover.reconnect();
        assert_eq!(rover.get_status(), Status::NotConnected);
        assert_eq!(transport.connects(), 2);
    }

    #[test]
    fn shutdown_releases_late_callers() {
        let transport = MockTransport::default();
        let rover = Rover::spawn(transport, EngineConfig::default()).unwrap();
        let sender = rover.sender.clone();
        rover.shutdown();

        let (tx, rx) = mpsc::channel();
        let late = Rover::<MockTransport> {
            sender,
            thread: None,
        };
        late.query_ultrasonic_range(move |result| tx.send(result).unwrap());

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Err(EngineError::Shutdown));
        assert_eq!(late.get_status(), Status::NotConnected);
    }
}
