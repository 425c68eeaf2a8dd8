//! Attribute values and reference expressions
//!
//! Declared attributes are plain JSON values in which strings may embed
//! interpolations of the form `${kind.name.attribute}`. A string that is a
//! single interpolation becomes a [`AttributeValue::Reference`]; a string
//! mixing text and interpolations becomes [`AttributeValue::Computed`].
//! Everything else is a [`AttributeValue::Literal`].
//!
//! Attribute paths may descend into maps and lists:
//! `${aws_db_instance.gallery.endpoint.address}` or
//! `${aws_subnet.public.cidr_blocks[0]}`.

use crate::address::{ResourceAddress, is_identifier};
use crate::error::{ModelError, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

/// Resolved attribute values, keyed by attribute name.
pub type Attributes = BTreeMap<String, Value>;

/// Rendered in place of values that only become known once the producing
/// resource has been applied.
pub const UNKNOWN_VALUE: &str = "(known after apply)";

static INTERPOLATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\s*([^}]*?)\s*\}").expect("interpolation pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Path into a resource's attributes. The first segment is always the
/// attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributePath(Vec<PathSegment>);

impl AttributePath {
    pub fn attribute(name: impl Into<String>) -> Self {
        Self(vec![PathSegment::Key(name.into())])
    }

    fn parse(input: &str) -> std::result::Result<Self, &'static str> {
        let mut segments = Vec::new();

        for part in input.split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(pos) => part.split_at(pos),
                None => (part, ""),
            };
            if key.is_empty() {
                return Err("empty path segment");
            }
            if key.contains(']') || key.chars().any(char::is_whitespace) {
                return Err("malformed path segment");
            }
            segments.push(PathSegment::Key(key.to_string()));

            while !rest.is_empty() {
                if !rest.starts_with('[') {
                    return Err("unexpected characters after index");
                }
                let close = rest.find(']').ok_or("unterminated index")?;
                let index = rest[1..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| "index must be a non-negative integer")?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
            }
        }

        Ok(Self(segments))
    }

    /// Name of the top-level attribute this path starts at.
    pub fn name(&self) -> &str {
        match self.0.first() {
            Some(PathSegment::Key(key)) => key,
            _ => "",
        }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Follow the path into `attributes`.
    pub fn select<'a>(&self, attributes: &'a Attributes) -> Option<&'a Value> {
        let root = attributes.get(self.name())?;
        self.select_nested(root)
    }

    /// Follow everything after the attribute name, starting at `root`.
    pub fn select_nested<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in self.0.iter().skip(1) {
            current = match segment {
                PathSegment::Key(key) => current.get(key.as_str())?,
                PathSegment::Index(index) => current.get(*index)?,
            };
        }
        Some(current)
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => write!(f, "{}", key)?,
                PathSegment::Key(key) => write!(f, ".{}", key)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// A reference to another resource's attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub address: ResourceAddress,
    pub path: AttributePath,
}

impl Reference {
    pub fn new(address: ResourceAddress, attribute: impl Into<String>) -> Self {
        Self {
            address,
            path: AttributePath::attribute(attribute),
        }
    }

    /// Parse the inside of an interpolation: `kind.name.attribute[...]`.
    pub fn parse(expression: &str) -> Result<Self> {
        let expr = expression.trim();
        let invalid = |reason: &str| ModelError::InvalidExpression {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = expr.splitn(3, '.');
        let kind = parts.next().unwrap_or_default();
        let name = parts.next().ok_or_else(|| invalid("missing resource name"))?;
        let rest = parts.next().ok_or_else(|| invalid("missing attribute name"))?;

        if !is_identifier(kind) || !is_identifier(name) {
            return Err(invalid("resource address must be <kind>.<name>"));
        }

        let path = AttributePath::parse(rest).map_err(invalid)?;

        Ok(Self {
            address: ResourceAddress::new(kind, name),
            path,
        })
    }

    /// The attribute name on the referenced resource.
    pub fn attribute(&self) -> &str {
        self.path.name()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.address, self.path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Interpolation(Reference),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Scalar(Value),
    List(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Literal(Literal),
    Reference(Reference),
    Computed(Vec<TemplatePart>),
}

/// Answer to "what is the value of this reference right now?".
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Known(Value),
    /// The producing resource has not been applied yet.
    Deferred,
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Known(Value),
    Deferred,
}

impl AttributeValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(Literal::Scalar(value.into()))
    }

    /// Convert a raw JSON value, parsing interpolations inside strings.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Self::parse(&s),
            Value::Array(items) => {
                let items = items
                    .into_iter()
                    .map(Self::from_json)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::Literal(Literal::List(items)))
            }
            Value::Object(map) => {
                let entries = map
                    .into_iter()
                    .map(|(k, v)| Self::from_json(v).map(|v| (k, v)))
                    .collect::<Result<BTreeMap<_, _>>>()?;
                Ok(Self::Literal(Literal::Map(entries)))
            }
            scalar => Ok(Self::Literal(Literal::Scalar(scalar))),
        }
    }

    /// Parse a string attribute.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parts = Vec::new();
        let mut last = 0;

        for caps in INTERPOLATION.captures_iter(input) {
            let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                parts.push(TemplatePart::Text(input[last..whole.start()].to_string()));
            }
            parts.push(TemplatePart::Interpolation(Reference::parse(expr.as_str())?));
            last = whole.end();
        }

        if parts.is_empty() {
            return Ok(Self::literal(input));
        }
        if last < input.len() {
            parts.push(TemplatePart::Text(input[last..].to_string()));
        }

        if let [TemplatePart::Interpolation(reference)] = parts.as_slice() {
            return Ok(Self::Reference(reference.clone()));
        }
        Ok(Self::Computed(parts))
    }

    /// All references embedded anywhere in this value, in source order.
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Self::Literal(Literal::Scalar(_)) => {}
            Self::Literal(Literal::List(items)) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Self::Literal(Literal::Map(entries)) => {
                for value in entries.values() {
                    value.collect_references(out);
                }
            }
            Self::Reference(reference) => out.push(reference),
            Self::Computed(parts) => {
                for part in parts {
                    if let TemplatePart::Interpolation(reference) = part {
                        out.push(reference);
                    }
                }
            }
        }
    }

    /// Resolve the value to plain JSON.
    ///
    /// Returns `Err` with the first reference the lookup reported as
    /// [`Lookup::Missing`].
    pub fn resolve<F>(&self, lookup: &mut F) -> std::result::Result<Resolved, Reference>
    where
        F: FnMut(&Reference) -> Lookup,
    {
        match self {
            Self::Literal(Literal::Scalar(value)) => Ok(Resolved::Known(value.clone())),
            Self::Literal(Literal::List(items)) => {
                let mut values = Vec::with_capacity(items.len());
                let mut deferred = false;
                for item in items {
                    match item.resolve(lookup)? {
                        Resolved::Known(v) => values.push(v),
                        Resolved::Deferred => deferred = true,
                    }
                }
                Ok(if deferred {
                    Resolved::Deferred
                } else {
                    Resolved::Known(Value::Array(values))
                })
            }
            Self::Literal(Literal::Map(entries)) => {
                let mut map = serde_json::Map::new();
                let mut deferred = false;
                for (key, item) in entries {
                    match item.resolve(lookup)? {
                        Resolved::Known(v) => {
                            map.insert(key.clone(), v);
                        }
                        Resolved::Deferred => deferred = true,
                    }
                }
                Ok(if deferred {
                    Resolved::Deferred
                } else {
                    Resolved::Known(Value::Object(map))
                })
            }
            Self::Reference(reference) => match lookup(reference) {
                Lookup::Known(v) => Ok(Resolved::Known(v)),
                Lookup::Deferred => Ok(Resolved::Deferred),
                Lookup::Missing => Err(reference.clone()),
            },
            Self::Computed(parts) => {
                let mut rendered = String::new();
                let mut deferred = false;
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => rendered.push_str(text),
                        TemplatePart::Interpolation(reference) => match lookup(reference) {
                            Lookup::Known(Value::String(s)) => rendered.push_str(&s),
                            Lookup::Known(other) => rendered.push_str(&other.to_string()),
                            Lookup::Deferred => deferred = true,
                            Lookup::Missing => return Err(reference.clone()),
                        },
                    }
                }
                Ok(if deferred {
                    Resolved::Deferred
                } else {
                    Resolved::Known(Value::String(rendered))
                })
            }
        }
    }
}
