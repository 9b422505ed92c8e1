//! ekumen-terminal: drives the automation CLI inside a pseudo-terminal and
//! answers its credential prompts.
//!
//! The pieces, leaves first:
//! - [`command`]: quotes an argument vector into one shell-safe command line
//! - [`session`]: a PTY-backed child process with pattern waits
//! - [`prompt`]: ordered recognizers that classify pending output
//! - [`dispatch`]: decides which credential (if any) answers a prompt
//! - [`transcript`]: collects the text seen between prompts
//! - [`verdict`]: the `{success, output, error}` record returned to callers
//! - [`automaton`]: the bounded read/classify/respond loop tying them together
//! - [`runner`]: validates a run request and invokes `ansible` / `ansible-playbook`
//!
//! # Quick start
//!
//! ```rust,no_run
//! use ekumen_core::RunnerConfig;
//! use ekumen_terminal::runner::{AnsibleRunner, RunRequest};
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = AnsibleRunner::new(RunnerConfig::default());
//!     let request = RunRequest {
//!         inventory: "10.0.0.5".to_string(),
//!         password: "secret".to_string(),
//!         ..RunRequest::default()
//!     };
//!     let verdict = runner.run(request).await;
//!     println!("{}", verdict.output);
//! }
//! ```

pub mod automaton;
pub mod command;
pub mod dispatch;
pub mod error;
pub mod prompt;
pub mod runner;
pub mod session;
pub mod transcript;
pub mod types;
pub mod verdict;

pub use error::{Result, TerminalError};
pub use types::{Credentials, SessionId, SessionOptions};
pub use verdict::{OutputArchive, Verdict};
