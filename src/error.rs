use crate::lifecycle::LifecycleError;
use thiserror::Error;

pub type Result<T, E = BootstageError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BootstageError {
    #[error("Missing configuration: {key}")]
    MissingConfiguration { key: String },

    #[error("Invalid configuration for {key}: {message}")]
    InvalidConfiguration { key: String, message: String },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BootstageError {
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingConfiguration { key: key.into() }
    }

    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            key: key.into(),
            message: message.into(),
        }
    }
}
