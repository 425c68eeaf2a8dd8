//! Local providers for SkyFlow
//!
//! Resource kinds that need no cloud account:
//!
//! - **local_file**: a file under a root directory
//! - **null_resource**: a resource that only lives in state
//!
//! # Example
//!
//! ```ignore
//! use skyflow_engine::ProviderRegistry;
//!
//! let mut registry = ProviderRegistry::new();
//! skyflow_provider_local::register(&mut registry, "./out");
//! ```

pub mod error;
pub mod file;
pub mod null;

pub use error::{LocalProviderError, Result};
pub use file::LocalFileProvider;
pub use null::NullResourceProvider;

use skyflow_engine::ProviderRegistry;
use std::path::PathBuf;
use std::sync::Arc;

/// Register every local provider, with `local_file` rooted at `root`.
pub fn register(registry: &mut ProviderRegistry, root: impl Into<PathBuf>) {
    registry.register(file::KIND, Arc::new(LocalFileProvider::new(root)));
    registry.register(null::KIND, Arc::new(NullResourceProvider::new()));
}
