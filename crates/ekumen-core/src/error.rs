use thiserror::Error;

#[derive(Debug, Error)]
pub enum EkumenError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EkumenError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            EkumenError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, EkumenError>;
