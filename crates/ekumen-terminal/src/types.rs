//! Shared data types for ekumen-terminal.

use ekumen_core::RunnerConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Opaque identifier for one PTY session, used to correlate log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh random session ID (UUIDv4).
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionOptions
// ---------------------------------------------------------------------------

/// Everything a session needs besides the command line itself.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Shell binary that runs the command line via `-c`.
    pub shell: String,

    /// Working directory for the child.
    pub cwd: PathBuf,

    /// Variables added on top of the inherited environment.
    pub env: Vec<(String, String)>,

    /// Overall deadline for the whole session.
    pub overall_timeout: Duration,

    /// Longest single wait for output before the idle check runs.
    pub read_timeout: Duration,

    /// Upper bound on prompt/response cycles.
    pub max_round_trips: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&RunnerConfig::default())
    }
}

impl SessionOptions {
    /// Derive session options from runner configuration.
    ///
    /// `cwd` defaults to the current directory; callers normally replace it
    /// with a per-run scratch directory.
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
            env: Vec::new(),
            overall_timeout: Duration::from_secs(config.command_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            max_round_trips: config.max_round_trips,
        }
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// The secrets a session may type into the terminal.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Connection (SSH) password.
    pub password: String,

    /// Privilege-escalation password. `None` or empty means "reuse `password`".
    pub become_password: Option<String>,
}

impl Credentials {
    pub fn new(password: impl Into<String>, become_password: Option<String>) -> Self {
        Self {
            password: password.into(),
            become_password,
        }
    }

    pub fn ssh(&self) -> &str {
        &self.password
    }

    /// The become password, falling back to the SSH password when unset.
    pub fn become_secret(&self) -> &str {
        match self.become_password.as_deref() {
            Some(p) if !p.is_empty() => p,
            _ => &self.password,
        }
    }
}

// Secrets never reach logs, even through `{:?}`.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &"<redacted>")
            .field(
                "become_password",
                &self.become_password.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
