use std::{
    borrow::Cow,
    fmt,
    io::{self, BufRead, BufReader, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use log::{debug, trace, warn};
use thiserror::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
/// Bound on a single frame write; a stalled peer fails the send instead of
/// holding up the caller.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("transport is not open")]
    Closed,
    #[error("could not resolve address '{0}'")]
    AddressResolution(String),
}

/// Lifecycle and data notifications raised by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Error(String),
    Close,
}

/// Callback receiving `(generation, event)` pairs.
pub type Emit = dyn Fn(u64, TransportEvent) + Send + Sync;

/// Where a transport reports its events.
///
/// Each connect attempt is handed a sink stamped with its own generation, so
/// the receiver can tell events of a dead attempt from those of the live one.
#[derive(Clone)]
pub struct TransportSink {
    generation: u64,
    emit: Arc<Emit>,
}

impl TransportSink {
    pub fn new(generation: u64, emit: Arc<Emit>) -> Self {
        Self { generation, emit }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: TransportEvent) {
        (self.emit)(self.generation, event)
    }
}

impl fmt::Debug for TransportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSink")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Frame-oriented link to the rover.
///
/// Implementations must not block in [`Transport::connect`]: the outcome of an
/// attempt is reported later through the sink as `Open`, or as `Error`/`Close`.
pub trait Transport: Send {
    fn connect(&mut self, sink: TransportSink) -> Result<(), TransportError>;

    fn send(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Request a graceful close; confirmed by a `Close` event.
    fn close(&mut self);
}

#[derive(Default)]
struct Link {
    stream: Mutex<Option<TcpStream>>,
    closed: AtomicBool,
}

impl Link {
    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let slot = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(stream) = slot.as_ref() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Newline-delimited text frames over TCP.
///
/// Connecting and reading happen on a background thread; `send` writes
/// directly on the caller's thread, bounded by a write timeout.
pub struct TcpTransport {
    address: SocketAddr,
    link: Option<Arc<Link>>,
}

impl TcpTransport {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            link: None,
        }
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, sink: TransportSink) -> Result<(), TransportError> {
        if let Some(old) = self.link.take() {
            old.shutdown();
        }

        let link = Arc::new(Link::default());
        let handle = Arc::clone(&link);
        let address = self.address;
        thread::Builder::new()
            .name(format!("rover-link-{}", sink.generation()))
            .spawn(move || read_frames(address, handle, sink))?;

        self.link = Some(link);
        Ok(())
    }

    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::Closed)?;
        let slot = link.stream.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stream = slot.as_ref().ok_or(TransportError::Closed)?;

        stream.write_all(frame.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(link) = self.link.as_ref() {
            link.shutdown();
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_frames(address: SocketAddr, link: Arc<Link>, sink: TransportSink) {
    debug!("connecting to {address}");
    let stream = match TcpStream::connect_timeout(&address, CONNECT_TIMEOUT) {
        Ok(stream) => stream,
        Err(e) => {
            sink.emit(TransportEvent::Error(e.to_string()));
            return;
        }
    };

    if let Err(e) = stream.set_write_timeout(Some(WRITE_TIMEOUT)) {
        sink.emit(TransportEvent::Error(e.to_string()));
        return;
    }

    let reader = match stream.try_clone() {
        Ok(reader) => reader,
        Err(e) => {
            sink.emit(TransportEvent::Error(e.to_string()));
            return;
        }
    };

    {
        let mut slot = link.stream.lock().unwrap_or_else(PoisonError::into_inner);
        if link.closed.load(Ordering::SeqCst) {
            let _ = stream.shutdown(Shutdown::Both);
            sink.emit(TransportEvent::Close);
            return;
        }
        *slot = Some(stream);
    }
    sink.emit(TransportEvent::Open);

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if let Cow::Owned(_) = line {
                    warn!("frame is not valid UTF-8: {buf:?}");
                }
                let frame = line.trim_end_matches(['\n', '\r']);
                trace!("frame received: {frame:?}");
                sink.emit(TransportEvent::Message(frame.to_string()));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if !link.closed.load(Ordering::SeqCst) => {
                sink.emit(TransportEvent::Error(e.to_string()));
                return;
            }
            Err(_) => break,
        }
    }

    sink.emit(TransportEvent::Close);
}
