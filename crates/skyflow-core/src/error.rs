use crate::address::ResourceAddress;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid resource address '{0}': expected <kind>.<name>")]
    InvalidAddress(String),

    #[error("Invalid reference expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("Duplicate resource declaration: {0}")]
    DuplicateDeclaration(ResourceAddress),

    #[error("Unknown reference in {address}: '{reference}' does not name a declared resource")]
    UnknownReference {
        address: ResourceAddress,
        reference: String,
    },

    #[error("Cyclic dependency detected: {}", format_cycle(.cycle))]
    CyclicDependency { cycle: Vec<ResourceAddress> },

    #[error("Unresolved reference in {address}: '{reference}' has no known value")]
    UnresolvedReference {
        address: ResourceAddress,
        reference: String,
    },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_cycle(cycle: &[ResourceAddress]) -> String {
    let mut parts: Vec<String> = cycle.iter().map(ToString::to_string).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}

pub type Result<T> = std::result::Result<T, ModelError>;
