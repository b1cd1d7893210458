//! Error types for katmon-core.

use thiserror::Error;

/// Sensor tree error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed sensor name: {0}")]
    MalformedSensorName(String),

    #[error("Unknown team: {0}")]
    UnknownTeam(char),

    #[error("Host index {index} out of range for team {team} ({size} hosts)")]
    HostIndexOutOfRange { team: char, index: usize, size: usize },
}

/// Result type alias for sensor tree operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;
