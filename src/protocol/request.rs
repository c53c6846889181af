use std::fmt;

use crate::engine::EngineError;

/// Measurement axis of a positional reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Heading,
}

impl Axis {
    fn suffix(self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Heading => "HeadingDegrees",
        }
    }
}

impl TryFrom<&str> for Axis {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "heading" | "h" => Ok(Axis::Heading),
            other => Err(EngineError::InvalidAxis(other.to_string())),
        }
    }
}

/// A named sensor read understood by the rover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Position(Axis),
    ArtifactId,
    ArtifactPosition(Axis),
    ObstaclePosition { id: u32, axis: Axis },
    UltrasonicRange,
}

impl Query {
    /// Reporter name the rover uses for this query, also the key its result
    /// comes back under.
    pub fn reporter_name(&self) -> String {
        match self {
            Query::Position(axis) => format!("rover{}", axis.suffix()),
            Query::ArtifactId => "artifactId".to_string(),
            Query::ArtifactPosition(Axis::Heading) => "artifactBearingDegrees".to_string(),
            Query::ArtifactPosition(axis) => format!("artifact{}", axis.suffix()),
            Query::ObstaclePosition { id, axis } => format!("Obstacle_{id}_{}", axis.suffix()),
            Query::UltrasonicRange => "ultrasonicRangeCM".to_string(),
        }
    }
}

/// Outbound frame sent to the rover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Reset,
    Move(i32),
    Turn(i32),
    DetectArtifact,
    Reporter(String),
}

impl From<Query> for Request {
    fn from(value: Query) -> Self {
        Request::Reporter(value.reporter_name())
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Reset => write!(f, "reset"),
            Request::Move(distance) => write!(f, "move{distance}"),
            Request::Turn(angle) => write!(f, "turn{angle}"),
            Request::DetectArtifact => write!(f, "detectArtifact"),
            Request::Reporter(name) => write!(f, "reporter{name}"),
        }
    }
}
