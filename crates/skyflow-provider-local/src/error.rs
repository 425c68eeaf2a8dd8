//! Local provider error types

use skyflow_engine::ProviderError;
use std::io::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalProviderError {
    #[error("Missing required attribute '{0}'")]
    MissingAttribute(&'static str),

    #[error("Attribute '{name}' is invalid: {reason}")]
    InvalidAttribute { name: &'static str, reason: String },

    #[error("Path '{0}' escapes the provider root")]
    PathEscapesRoot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LocalProviderError>;

impl From<LocalProviderError> for ProviderError {
    fn from(error: LocalProviderError) -> Self {
        match &error {
            LocalProviderError::MissingAttribute(_)
            | LocalProviderError::InvalidAttribute { .. }
            | LocalProviderError::PathEscapesRoot(_) => {
                ProviderError::InvalidConfig(error.to_string())
            }
            LocalProviderError::Io(io) => match io.kind() {
                ErrorKind::NotFound => ProviderError::NotFound(error.to_string()),
                ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                    ProviderError::Transient(error.to_string())
                }
                _ => ProviderError::Failed(error.to_string()),
            },
        }
    }
}
