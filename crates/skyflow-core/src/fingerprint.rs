//! Attribute fingerprints
//!
//! A fingerprint is the blake3 digest of the canonical JSON encoding of a
//! resource's resolved input attributes. `Attributes` is a `BTreeMap` and
//! `serde_json` objects are kept sorted, so equal inputs always hash alike.

use crate::value::Attributes;

pub fn fingerprint(attributes: &Attributes) -> String {
    let canonical = serde_json::to_vec(attributes).unwrap_or_default();
    blake3::hash(&canonical).to_hex().to_string()
}
