//! Engine error types

use skyflow_core::{ModelError, ResourceAddress};
use thiserror::Error;

/// Errors raised while planning or executing
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("No provider registered for resource kind '{0}'")]
    ProviderNotFound(String),

    #[error("Target {0} is neither declared nor recorded in state")]
    UnknownTarget(ResourceAddress),

    #[error("Resource not found in state: {0}")]
    ResourceNotFound(ResourceAddress),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned by resource providers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Worth retrying: throttling, timeouts, eventual consistency.
    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Failed(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
