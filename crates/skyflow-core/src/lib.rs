//! SkyFlow Core
//!
//! The resource model of SkyFlow: addresses, declarations and attribute
//! values, reference resolution and the dependency graph.
//!
//! # Pipeline
//!
//! ```text
//!  stack.yaml ──▶ loader ──▶ DeclarationSet
//!                                 │
//!                       resolver::resolve_references
//!                                 │
//!                                 ▼
//!                         Vec<DependencyEdge>
//!                                 │
//!                       DependencyGraph::build
//!                                 │
//!                                 ▼
//!                 topological order (or a cycle error)
//! ```
//!
//! Everything here is synchronous and side-effect free apart from the
//! loader reading its input file.

pub mod address;
pub mod declaration;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod loader;
pub mod resolver;
pub mod value;

// Re-exports
pub use address::ResourceAddress;
pub use declaration::{DeclarationSet, ResolvedAttributes, ResourceDeclaration};
pub use error::{ModelError, Result};
pub use fingerprint::fingerprint;
pub use graph::DependencyGraph;
pub use loader::{load_declarations, parse_json, parse_yaml};
pub use resolver::{DependencyEdge, resolve_references};
pub use value::{
    AttributePath, AttributeValue, Attributes, Literal, Lookup, PathSegment, Reference, Resolved,
    TemplatePart, UNKNOWN_VALUE,
};
