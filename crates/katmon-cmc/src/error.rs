//! CMC and array error types.

use katmon_core::ModelError;
use katmon_katcp::KatcpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CmcError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed inform: {0}")]
    MalformedInform(String),

    #[error("Invalid sensor pattern on line {line}: {reason}")]
    InvalidPattern { line: usize, reason: String },

    #[error("KATCP error: {0}")]
    Katcp(#[from] KatcpError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

pub type CmcResult<T> = Result<T, CmcError>;
