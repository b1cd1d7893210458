//! KATCP error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KatcpError {
    #[error("Message has no words")]
    EmptyMessage,

    #[error("Channel disconnected: {0}")]
    Disconnected(String),

    #[error("Line exceeds {max} bytes")]
    LineTooLong { max: usize },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type KatcpResult<T> = Result<T, KatcpError>;
