//! Rover wire protocol.
//!
//! This module defines the text protocol spoken between the engine and the rover
//! (or its simulator), and the transport abstraction frames travel over.
//!
//! # Overview
//!
//! Every transport frame carries exactly one logical message. There is no
//! reassembly: a frame either decodes to a known message or is reported as
//! unknown and skipped.
//!
//! Outbound frames:
//!
//! - `reset`
//! - `move<signedInt>` and `turn<signedInt>`, e.g. `move-20`, `turn90`
//! - `detectArtifact`
//! - `reporter<Name>`, e.g. `reporterroverX`
//!
//! Inbound frames:
//!
//! - `allCommandsComplete<flag>`: the outstanding actuation finished, `1` for
//!   success and anything else for failure.
//! - `reporterResult <name> <value>`: exactly three space-separated tokens.
//!
//! # Key Components
//!
//! - [`Request`]: Outbound frame, rendered with [`std::fmt::Display`].
//! - [`Query`]: Sensor reads and the reporter names they map to.
//! - [`Response`]: Decoded inbound frame.
//! - [`Transport`]: Abstraction over a frame-oriented link (e.g. TCP lines).
//!
//! # See Also
//!
//! - [`engine`](crate::engine): Correlates responses with the requests waiting on them.
mod request;
mod response;
mod transport;

#[cfg(test)]
pub(crate) use transport::mock;

pub use request::{Axis, Query, Request};
pub use response::Response;
pub use transport::{Emit, TcpTransport, Transport, TransportError, TransportEvent, TransportSink};
