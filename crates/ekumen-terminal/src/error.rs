//! Error types for the ekumen-terminal crate.

use thiserror::Error;

/// All errors that can originate from a run or one of its sessions.
///
/// None of these cross the runner boundary: `Verdict::from_error` folds each
/// one into the `{success, output, error}` record.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// PTY allocation or child-process spawn failed.
    #[error("PTY spawn error: {0}")]
    PtySpawn(String),

    /// Underlying I/O failure (read, write, flush, temp files).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The session's overall deadline expired.
    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The child closed its output while the protocol expected more.
    #[error("Unexpected end of output")]
    UnexpectedEof,

    /// The automation CLI is not installed or not on `PATH`.
    #[error("{tool} is not installed or not in PATH. Please install Ansible to use this application.")]
    ToolUnavailable { tool: String },

    /// The request was rejected before any process was started.
    #[error("{0}")]
    InvalidInput(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, TerminalError>;
