//! Error taxonomy for supervisor operations

use thiserror::Error;

/// Errors that can occur while orchestrating an exam session
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The browser subsystem never reported readiness within the retry budget.
    /// The session stays in `Idle`; nothing else was started.
    #[error("browser readiness handshake timed out after {attempts} attempts")]
    BrowserHandshakeTimeout { attempts: u32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("report artifact could not be written: {0}")]
    Report(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for supervisor operations
pub type SupervisorResult<T> = Result<T, SupervisorError>;
