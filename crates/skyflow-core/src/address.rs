//! Resource addresses
//!
//! A [`ResourceAddress`] is the `(kind, name)` pair that identifies a
//! declared resource. It is the key of the dependency graph and of the
//! state store, and is rendered as `kind.name`.

use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceAddress {
    kind: String,
    name: String,
}

impl ResourceAddress {
    /// Build an address from already-validated parts.
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Parse a `kind.name` string.
    pub fn parse(input: &str) -> Result<Self> {
        let (kind, name) = input
            .split_once('.')
            .ok_or_else(|| ModelError::InvalidAddress(input.to_string()))?;

        if !is_identifier(kind) || !is_identifier(name) {
            return Err(ModelError::InvalidAddress(input.to_string()));
        }

        Ok(Self::new(kind, name))
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Identifiers start with a letter or underscore and continue with
/// letters, digits, `_` or `-`.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl FromStr for ResourceAddress {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceAddress {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ResourceAddress> for String {
    fn from(address: ResourceAddress) -> Self {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let addr = ResourceAddress::parse("aws_lambda_function.gallery-api").unwrap();
        assert_eq!(addr.kind(), "aws_lambda_function");
        assert_eq!(addr.name(), "gallery-api");
        assert_eq!(addr.to_string(), "aws_lambda_function.gallery-api");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in ["", "vpc", ".main", "aws_vpc.", "aws_vpc.main.id", "1vpc.main"] {
            assert!(
                ResourceAddress::parse(input).is_err(),
                "expected '{}' to be rejected",
                input
            );
        }
    }

    #[test]
    fn test_serde_as_string() {
        let addr = ResourceAddress::new("heroku_app", "gallery");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"heroku_app.gallery\"");

        let back: ResourceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
        assert!(serde_json::from_str::<ResourceAddress>("\"nodot\"").is_err());
    }
}
