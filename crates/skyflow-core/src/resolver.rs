//! Reference resolution
//!
//! Scans every declaration for references and explicit `depends_on`
//! entries and turns them into [`DependencyEdge`]s.

use crate::address::ResourceAddress;
use crate::declaration::DeclarationSet;
use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// `from` depends on `to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: ResourceAddress,
    pub to: ResourceAddress,
}

impl DependencyEdge {
    pub fn new(from: ResourceAddress, to: ResourceAddress) -> Self {
        Self { from, to }
    }
}

/// Collect the dependency edges of `declarations`.
///
/// Edges are returned in declaration order, duplicates removed.
/// Fails with [`ModelError::UnknownReference`] when a reference or an
/// explicit dependency names an address that is not declared.
pub fn resolve_references(declarations: &DeclarationSet) -> Result<Vec<DependencyEdge>> {
    let mut edges = Vec::new();
    let mut seen = HashSet::new();

    for declaration in declarations.iter() {
        let from = declaration.address();

        for reference in declaration.references() {
            if !declarations.contains(&reference.address) {
                return Err(ModelError::UnknownReference {
                    address: from.clone(),
                    reference: reference.to_string(),
                });
            }
            let edge = DependencyEdge::new(from.clone(), reference.address.clone());
            if seen.insert(edge.clone()) {
                edges.push(edge);
            }
        }

        for dependency in declaration.depends_on() {
            if !declarations.contains(dependency) {
                return Err(ModelError::UnknownReference {
                    address: from.clone(),
                    reference: dependency.to_string(),
                });
            }
            let edge = DependencyEdge::new(from.clone(), dependency.clone());
            if seen.insert(edge.clone()) {
                edges.push(edge);
            }
        }
    }

    debug!(
        declarations = declarations.len(),
        edges = edges.len(),
        "Resolved references"
    );
    Ok(edges)
}
