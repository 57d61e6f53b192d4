use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TdpctlError {
    /// Requested value rejected before touching hardware
    #[error("invalid request: {0}")]
    Validation(String),

    /// The helper ran but replied with something unparseable
    #[error("unexpected output for `{command}`: {output}")]
    Protocol { command: String, output: String },

    /// The helper could not be spawned, timed out, or exited non-zero
    #[error("failed to execute `{command}`: {reason}")]
    Execution { command: String, reason: String },

    /// Vendor/register-space combination not implemented
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TdpctlError>;
