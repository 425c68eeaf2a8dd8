//! Resource declarations
//!
//! A [`ResourceDeclaration`] is one desired resource; a [`DeclarationSet`]
//! is the whole desired configuration. Declaration order is preserved and
//! used to break ties when ordering the graph.

use crate::address::ResourceAddress;
use crate::error::{ModelError, Result};
use crate::value::{AttributeValue, Attributes, Lookup, Reference, Resolved, UNKNOWN_VALUE};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDeclaration {
    address: ResourceAddress,
    attributes: BTreeMap<String, AttributeValue>,
    depends_on: Vec<ResourceAddress>,
}

impl ResourceDeclaration {
    pub fn new(address: ResourceAddress) -> Self {
        Self {
            address,
            attributes: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Add an attribute from raw JSON, parsing interpolations.
    pub fn with_json_attribute(mut self, name: impl Into<String>, value: Value) -> Result<Self> {
        self.attributes
            .insert(name.into(), AttributeValue::from_json(value)?);
        Ok(self)
    }

    pub fn with_dependency(mut self, address: ResourceAddress) -> Self {
        if !self.depends_on.contains(&address) {
            self.depends_on.push(address);
        }
        self
    }

    pub fn address(&self) -> &ResourceAddress {
        &self.address
    }

    pub fn kind(&self) -> &str {
        self.address.kind()
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn depends_on(&self) -> &[ResourceAddress] {
        &self.depends_on
    }

    /// References found anywhere in this declaration's attributes.
    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.attributes.values().flat_map(AttributeValue::references)
    }

    /// Addresses this declaration depends on, referenced or explicit,
    /// without duplicates.
    pub fn dependencies(&self) -> Vec<ResourceAddress> {
        let mut out: Vec<ResourceAddress> = Vec::new();
        let referenced = self.references().map(|r| &r.address);
        for address in referenced.chain(self.depends_on.iter()) {
            if !out.contains(address) {
                out.push(address.clone());
            }
        }
        out
    }

    /// Resolve every attribute through `lookup`.
    ///
    /// Attributes depending on not-yet-applied resources end up in
    /// [`ResolvedAttributes::deferred`] instead of failing.
    pub fn resolve<F>(&self, mut lookup: F) -> Result<ResolvedAttributes>
    where
        F: FnMut(&Reference) -> Lookup,
    {
        let mut resolved = ResolvedAttributes::default();

        for (name, value) in &self.attributes {
            match value.resolve(&mut lookup) {
                Ok(Resolved::Known(v)) => {
                    resolved.values.insert(name.clone(), v);
                }
                Ok(Resolved::Deferred) => {
                    resolved.deferred.insert(name.clone());
                }
                Err(reference) => {
                    return Err(ModelError::UnresolvedReference {
                        address: self.address.clone(),
                        reference: reference.to_string(),
                    });
                }
            }
        }

        Ok(resolved)
    }
}

/// Attribute values after reference resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedAttributes {
    pub values: Attributes,
    /// Attributes whose value is only known after a dependency is applied.
    pub deferred: BTreeSet<String>,
}

impl ResolvedAttributes {
    pub fn is_complete(&self) -> bool {
        self.deferred.is_empty()
    }

    /// Values with deferred attributes filled in by [`UNKNOWN_VALUE`].
    pub fn with_placeholders(&self) -> Attributes {
        let mut values = self.values.clone();
        for name in &self.deferred {
            values.insert(name.clone(), Value::String(UNKNOWN_VALUE.to_string()));
        }
        values
    }
}

/// The full desired configuration.
#[derive(Debug, Clone, Default)]
pub struct DeclarationSet {
    declarations: Vec<ResourceDeclaration>,
    index: HashMap<ResourceAddress, usize>,
}

impl DeclarationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, declaration: ResourceDeclaration) -> Result<()> {
        if self.index.contains_key(declaration.address()) {
            return Err(ModelError::DuplicateDeclaration(
                declaration.address().clone(),
            ));
        }
        self.index
            .insert(declaration.address().clone(), self.declarations.len());
        self.declarations.push(declaration);
        Ok(())
    }

    pub fn from_declarations(
        declarations: impl IntoIterator<Item = ResourceDeclaration>,
    ) -> Result<Self> {
        let mut set = Self::new();
        for declaration in declarations {
            set.add(declaration)?;
        }
        Ok(set)
    }

    pub fn get(&self, address: &ResourceAddress) -> Option<&ResourceDeclaration> {
        self.index
            .get(address)
            .and_then(|&i| self.declarations.get(i))
    }

    pub fn contains(&self, address: &ResourceAddress) -> bool {
        self.index.contains_key(address)
    }

    /// Position of `address` in declaration order.
    pub fn position(&self, address: &ResourceAddress) -> Option<usize> {
        self.index.get(address).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDeclaration> {
        self.declarations.iter()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &ResourceAddress> {
        self.declarations.iter().map(ResourceDeclaration::address)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}
