//! Declaration loader
//!
//! Reads a stack document (YAML or JSON) into a [`DeclarationSet`]:
//!
//! ```yaml
//! resources:
//!   - kind: aws_vpc
//!     name: main
//!     attributes:
//!       cidr_block: 10.0.0.0/16
//!   - kind: aws_subnet
//!     name: a
//!     attributes:
//!       vpc_id: ${aws_vpc.main.id}
//!     depends_on: [aws_vpc.main]
//! ```

use crate::address::ResourceAddress;
use crate::declaration::{DeclarationSet, ResourceDeclaration};
use crate::error::{ModelError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, instrument};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StackDocument {
    #[serde(default)]
    resources: Vec<RawDeclaration>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDeclaration {
    kind: String,
    name: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    depends_on: Vec<String>,
}

impl RawDeclaration {
    fn into_declaration(self) -> Result<ResourceDeclaration> {
        let address = ResourceAddress::parse(&format!("{}.{}", self.kind, self.name))?;
        let mut declaration = ResourceDeclaration::new(address);

        for (name, value) in self.attributes {
            declaration = declaration.with_json_attribute(name, value)?;
        }
        for dependency in &self.depends_on {
            declaration = declaration.with_dependency(ResourceAddress::parse(dependency)?);
        }

        Ok(declaration)
    }
}

fn into_set(document: StackDocument) -> Result<DeclarationSet> {
    let mut set = DeclarationSet::new();
    for raw in document.resources {
        set.add(raw.into_declaration()?)?;
    }
    Ok(set)
}

/// Parse a YAML stack document.
pub fn parse_yaml(content: &str) -> Result<DeclarationSet> {
    if content.trim().is_empty() {
        return Ok(DeclarationSet::new());
    }
    let document: StackDocument = serde_yaml::from_str(content)?;
    into_set(document)
}

/// Parse a JSON stack document.
pub fn parse_json(content: &str) -> Result<DeclarationSet> {
    let document: StackDocument = serde_json::from_str(content)?;
    into_set(document)
}

/// Load declarations from `path`. Files ending in `.json` are parsed as
/// JSON, everything else as YAML.
#[instrument(fields(path = %path.display()))]
pub fn load_declarations(path: &Path) -> Result<DeclarationSet> {
    debug!("Reading stack file");
    let content = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let set = if is_json {
        parse_json(&content)?
    } else {
        parse_yaml(&content)?
    };

    info!(resources = set.len(), "Declarations loaded");
    Ok(set)
}
