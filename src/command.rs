//! Interactive command module.
//!
//! This module defines the [`Command`] enum, which represents one line typed by an
//! operator driving the rover by hand, and how such a line is parsed.
//!
//! # Overview
//!
//! - `move <cm>` / `back <cm>`: drive forward or backward.
//! - `left <deg>` / `right <deg>`: turn on the spot.
//! - `detect`: look for an artifact.
//! - `pos <x|y|heading>`: rover position.
//! - `artifact id` / `artifact <x|y|heading>`: last detected artifact.
//! - `obstacle <id> <x|y|heading>`: a known obstacle.
//! - `range`: ultrasonic range in centimetres.
//! - `connect`: re-open the link after it was closed.
//! - `reset`, `status`, `.exit`.
//!
//! # Example
//! ```rust
//! use rover_link::{Axis, Command, Query};
//!
//! let cmd: Command = "pos x".try_into().unwrap();
//! assert_eq!(cmd, Command::Query(Query::Position(Axis::X)));
//! ```
use thiserror::Error;

use crate::protocol::{Axis, Query};

/// List of possible error that a command can throw.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("failed to read command: {0}")]
    Io(String),

    #[error("no command provided")]
    Empty,
}

/// High-level operator commands to run against a rover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Forward(i32),
    Backward(i32),
    Left(i32),
    Right(i32),
    Detect,
    Query(Query),
    Reset,
    Status,
    Connect,
    Exit,
}

fn number<N: std::str::FromStr>(command: &str, arg: Option<&str>) -> Result<N, CommandError> {
    let arg = arg.ok_or_else(|| CommandError::InvalidCommandArguments {
        command: command.to_string(),
        reason: format!("requires a numeric argument. Example: {command} 10"),
    })?;

    arg.parse::<N>()
        .map_err(|_| CommandError::InvalidCommandArguments {
            command: command.to_string(),
            reason: format!("'{arg}' is not a valid number"),
        })
}

fn axis(command: &str, arg: Option<&str>) -> Result<Axis, CommandError> {
    let reason = "requires an axis: x, y or heading".to_string();
    let arg = arg.ok_or_else(|| CommandError::InvalidCommandArguments {
        command: command.to_string(),
        reason: reason.clone(),
    })?;

    Axis::try_from(arg).map_err(|_| CommandError::InvalidCommandArguments {
        command: command.to_string(),
        reason,
    })
}

impl TryInto<Command> for &str {
    type Error = CommandError;

    fn try_into(self) -> Result<Command, Self::Error> {
        let parts = self.split_whitespace().collect::<Vec<&str>>();
        let Some(head) = parts.first() else {
            return Err(CommandError::Empty);
        };
        let arg = parts.get(1).copied();

        match head.to_lowercase().as_str() {
            ".exit" => Ok(Command::Exit),
            "reset" => Ok(Command::Reset),
            "status" => Ok(Command::Status),
            "connect" => Ok(Command::Connect),
            "detect" => Ok(Command::Detect),
            "range" => Ok(Command::Query(Query::UltrasonicRange)),
            "move" => Ok(Command::Forward(number("move", arg)?)),
            "back" => Ok(Command::Backward(number("back", arg)?)),
            "left" => Ok(Command::Left(number("left", arg)?)),
            "right" => Ok(Command::Right(number("right", arg)?)),
            "pos" => Ok(Command::Query(Query::Position(axis("pos", arg)?))),
            "artifact" => match arg {
                Some(id) if id.eq_ignore_ascii_case("id") => Ok(Command::Query(Query::ArtifactId)),
                arg => Ok(Command::Query(Query::ArtifactPosition(axis("artifact", arg)?))),
            },
            "obstacle" => {
                let id = number("obstacle", arg)?;
                let axis = axis("obstacle", parts.get(2).copied())?;
                Ok(Command::Query(Query::ObstaclePosition { id, axis }))
            }
            _ => Err(CommandError::UnrecognizedCommand(self.trim().to_string())),
        }
    }
}
