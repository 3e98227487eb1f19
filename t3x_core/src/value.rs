//! Generic value tree for decoded manifests.

use std::collections::HashMap;
use std::fmt;

/// A mapping key.
///
/// The native serialization only allows integer and string keys. String
/// keys are raw bytes; legacy archives use latin-1 names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// An integer key (`i:<n>;`).
    Index(i64),
    /// A string key (`s:<len>:"<name>";`).
    Name(Vec<u8>),
}

impl Key {
    /// Length of the key as printed, used to align sibling keys.
    pub fn display_len(&self) -> usize {
        match self {
            Key::Index(index) => index.to_string().len(),
            Key::Name(name) => name.len(),
        }
    }

    /// Returns true if this key is the string `name`.
    pub fn is(&self, name: &str) -> bool {
        matches!(self, Key::Name(own) if own.as_slice() == name.as_bytes())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(index) => write!(f, "{}", index),
            Key::Name(name) => f.write_str(&String::from_utf8_lossy(name)),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.as_bytes().to_vec())
    }
}

impl From<i64> for Key {
    fn from(index: i64) -> Self {
        Key::Index(index)
    }
}

/// An ordered sequence of uniquely keyed values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapping {
    entries: Vec<(Key, ValueNode)>,
    // Position of each key in `entries`
    index: HashMap<Key, usize>,
}

impl Mapping {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty mapping with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Append an entry.
    ///
    /// Returns the rejected value if the key is already present, leaving
    /// the mapping unchanged.
    pub fn insert(&mut self, key: Key, value: ValueNode) -> Result<(), (Key, ValueNode)> {
        if self.index.contains_key(&key) {
            return Err((key, value));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        Ok(())
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &Key) -> bool {
        self.index.contains_key(key)
    }

    /// Look up a value by string key.
    pub fn get(&self, name: &str) -> Option<&ValueNode> {
        self.index
            .get(&Key::from(name))
            .map(|&position| &self.entries[position].1)
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &ValueNode)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the mapping has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Longest printed key among the immediate children.
    pub fn key_width(&self) -> usize {
        self.entries
            .iter()
            .map(|(key, _)| key.display_len())
            .max()
            .unwrap_or(0)
    }
}

/// A node of the decoded manifest tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueNode {
    /// A byte string. Not necessarily UTF-8: file contents live here.
    Scalar(Vec<u8>),
    /// A signed integer.
    Integer(i64),
    /// A boolean.
    Boolean(bool),
    /// A floating point number.
    Float(f64),
    /// The null value.
    Null,
    /// A nested mapping.
    Mapping(Mapping),
}

impl ValueNode {
    /// Build a scalar from anything byte-like.
    pub fn scalar(bytes: impl Into<Vec<u8>>) -> Self {
        ValueNode::Scalar(bytes.into())
    }

    /// The bytes of a scalar.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ValueNode::Scalar(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The mapping, if this node is one.
    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            ValueNode::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ValueNode::Scalar(_) => "string",
            ValueNode::Integer(_) => "integer",
            ValueNode::Boolean(_) => "boolean",
            ValueNode::Float(_) => "float",
            ValueNode::Null => "null",
            ValueNode::Mapping(_) => "mapping",
        }
    }
}

impl From<Mapping> for ValueNode {
    fn from(mapping: Mapping) -> Self {
        ValueNode::Mapping(mapping)
    }
}
