//! Immutable attribute containers and their canonical signatures.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A boolean flag attribute.
    Bool(bool),
    /// An integral attribute (e.g. a target platform version).
    Int(i64),
    /// A textual attribute (the common case).
    Text(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// The stable identity of an attribute container's contents.
///
/// Two containers holding equal entries produce equal signatures regardless
/// of how they were assembled, which makes signatures usable as cache keys
/// shared across unrelated components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeSignature(String);

impl AttributeSignature {
    /// Returns the hex digest backing this signature.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttributeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable map of named attribute values.
///
/// Entries are kept sorted by name so iteration order, equality and the
/// canonical signature are all deterministic. Containers are never mutated
/// after construction; combinators return new containers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeContainer {
    entries: BTreeMap<String, AttributeValue>,
}

impl AttributeContainer {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a container with the given entry added (or replaced).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.entries.insert(name.into(), value.into());
        self
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.entries.get(name)
    }

    /// True when no attributes are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of attributes in the container.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the union of `self` and `other`, with `other` winning on
    /// conflicting names.
    ///
    /// This is the attribute algebra used when a transform step's target
    /// delta is applied on top of a source variant's attributes.
    #[must_use]
    pub fn concat(&self, other: &Self) -> Self {
        let mut entries = self.entries.clone();
        for (k, v) in &other.entries {
            entries.insert(k.clone(), v.clone());
        }
        Self { entries }
    }

    /// True when every entry of `other` is present in `self` with an equal
    /// value.
    #[must_use]
    pub fn contains_all(&self, other: &Self) -> bool {
        other
            .entries
            .iter()
            .all(|(k, v)| self.entries.get(k) == Some(v))
    }

    /// Counts the entries of `other` that `self` carries with equal values.
    #[must_use]
    pub fn shared_entry_count(&self, other: &Self) -> usize {
        other
            .entries
            .iter()
            .filter(|(k, v)| self.entries.get(*k) == Some(v))
            .count()
    }

    /// Computes the canonical signature of this container.
    ///
    /// The digest covers names and values in sorted order, so structurally
    /// equal containers always hash to the same signature.
    #[must_use]
    pub fn signature(&self) -> AttributeSignature {
        let mut hasher = Sha256::new();
        for (name, value) in &self.entries {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.to_string().as_bytes());
            hasher.update([0u8]);
        }
        AttributeSignature(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for AttributeContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, "}}")
    }
}
