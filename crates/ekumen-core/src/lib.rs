//! ekumen-core: configuration and shared error types for Ekumen.

pub mod config;
pub mod error;

pub use config::{EkumenConfig, RunnerConfig};
pub use error::{EkumenError, Result};
