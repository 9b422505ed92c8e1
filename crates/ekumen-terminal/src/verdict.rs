//! The record every run ends in.

use crate::error::TerminalError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Outcome of one run, as handed back to callers.
///
/// `output` carries the transcript on the normal path; `error` carries the
/// description when the run failed before or outside the tool itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub success: bool,
    pub output: String,
    pub error: String,
}

impl Verdict {
    /// Verdict for a session that reached teardown.
    ///
    /// Success requires an exit status of exactly zero; a missing status
    /// (child killed, never reaped cleanly) counts as failure.
    pub fn from_exit(exit_code: Option<u32>, output: String) -> Self {
        Self {
            success: exit_code == Some(0),
            output,
            error: String::new(),
        }
    }

    /// Verdict for a run that failed with `err`.
    pub fn from_error(err: &TerminalError) -> Self {
        let error = match err {
            TerminalError::Timeout { .. } => "Command timed out".to_string(),
            other => other.to_string(),
        };
        Self::failure(error)
    }

    /// A failed verdict with only an error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.into(),
        }
    }

    /// Text suitable for saving: the output, plus the error under a
    /// separator when there is one.
    pub fn archive_text(&self) -> String {
        if self.error.is_empty() {
            self.output.clone()
        } else {
            format!("{}\n\n--- STDERR ---\n{}", self.output, self.error)
        }
    }
}

/// A verdict's saved text together with when the run finished.
///
/// Built per request by the caller; nothing here is shared between runs.
#[derive(Debug, Clone, Serialize)]
pub struct OutputArchive {
    pub content: String,
    pub finished_at: DateTime<Local>,
}

impl OutputArchive {
    pub fn new(verdict: &Verdict, finished_at: DateTime<Local>) -> Self {
        Self {
            content: verdict.archive_text(),
            finished_at,
        }
    }

    /// `ansible_output_<YYYYmmdd_HHMMSS>.txt`
    pub fn filename(&self) -> String {
        format!(
            "ansible_output_{}.txt",
            self.finished_at.format("%Y%m%d_%H%M%S")
        )
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
