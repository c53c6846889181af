pub mod cli;
pub mod command;
pub mod config;
pub mod engine;
pub mod protocol;

pub use cli::{Interrupt, prompt};
pub use command::{Command, CommandError};
pub use config::{ConflictPolicy, EngineConfig};
pub use engine::{ConnectionState, EngineError, ProtocolEngine, Rover, Status};
pub use protocol::{Axis, Query, Request, Response};
