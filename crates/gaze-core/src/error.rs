//! Runtime error type.
//!
//! One enum covers every failure the runtime surfaces, so external clients
//! always receive a typed response with a stable `error_code`. Policies for
//! when each kind is fatal versus logged-and-swallowed live with the
//! components that produce them.

use thiserror::Error;

/// Convenience alias for results using the runtime error type.
pub type GazeResult<T> = std::result::Result<T, GazeError>;

#[derive(Error, Debug)]
pub enum GazeError {
    /// A named plugin or resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A plugin library is missing symbols, or a message or configuration
    /// document failed to parse.
    #[error("bad format: {0}")]
    BadFormat(String),

    /// The operation is not valid in the current runtime state, e.g. applying
    /// graphics settings after the window exists or replacing the protocol
    /// while a session is running.
    #[error("not permitted: {0}")]
    NotPermitted(String),

    /// A resource is temporarily unavailable; the client may retry.
    #[error("busy: {0}")]
    Busy(String),

    /// Socket, filesystem or persistence layer failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Propagated from a plugin's lifecycle or processing entry points.
    #[error("plugin fault: {0}")]
    Plugin(String),
}

impl GazeError {
    /// Stable integer carried in the wire response envelope.
    pub fn wire_code(&self) -> i32 {
        match self {
            GazeError::NotFound(_) => 1,
            GazeError::BadFormat(_) => 2,
            GazeError::NotPermitted(_) => 3,
            GazeError::Busy(_) => 4,
            GazeError::Io(_) => 5,
            GazeError::Plugin(_) => 6,
        }
    }
}

impl From<serde_json::Error> for GazeError {
    fn from(err: serde_json::Error) -> Self {
        GazeError::BadFormat(err.to_string())
    }
}
