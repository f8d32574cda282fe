//! Ordered tag map with per-tag provenance.
//!
//! Tags keep the insertion order of their keys. Reordering a tag map is
//! observable as a spurious diff against the backend, so every operation
//! that rebuilds a map appends new keys after the existing ones.

use std::fmt;

use indexmap::IndexMap;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Which actor introduced a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Declared by the user in the resource spec.
    User,
    /// Injected by the controller from its default tag set.
    ControllerDefault,
    /// Injected out-of-band by the backend service.
    BackendSystem,
}

impl Provenance {
    /// Stable string identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::ControllerDefault => "controller-default",
            Self::BackendSystem => "backend-system",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tag value together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub value: String,
    pub provenance: Provenance,
}

impl Tag {
    /// Create a tag with the given provenance.
    pub fn new(value: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            value: value.into(),
            provenance,
        }
    }
}

/// Insertion-ordered tag map.
///
/// Equality compares keys and values only: two maps holding the same pairs
/// in a different order, or with different provenance, are equal. The wire
/// form is a plain `key: value` mapping, and deserialized tags are
/// attributed to the user.
#[derive(Debug, Clone, Default)]
pub struct Tags {
    entries: IndexMap<String, Tag>,
}

impl Tags {
    /// Create an empty tag map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tag map from ordered pairs, all with the same provenance.
    ///
    /// A repeated key keeps its first position and takes the last value.
    pub fn from_pairs<I, K, V>(pairs: I, provenance: Provenance) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), Tag::new(v, provenance)))
            .collect();
        Self { entries }
    }

    /// Insert or replace a tag. A replaced key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, tag: Tag) -> Option<Tag> {
        self.entries.insert(key.into(), tag)
    }

    /// Insert a tag only if the key is absent. Returns whether it was added.
    pub fn insert_if_absent(&mut self, key: &str, tag: Tag) -> bool {
        if self.entries.contains_key(key) {
            return false;
        }
        self.entries.insert(key.to_string(), tag);
        true
    }

    /// Keep only the tags for which the predicate holds, preserving order.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Tag) -> bool) {
        self.entries.retain(|k, t| keep(k, t));
    }

    pub fn get(&self, key: &str) -> Option<&Tag> {
        self.entries.get(key)
    }

    /// Value stored under `key`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|t| t.value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Tags in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tag)> {
        self.entries.iter().map(|(k, t)| (k.as_str(), t))
    }

    /// Key/value pairs in insertion order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, t)| (k.as_str(), t.value.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Tags {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(k, t)| other.value(k) == Some(t.value.as_str()))
    }
}

impl Eq for Tags {}

impl Serialize for Tags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.pairs())
    }
}

impl<'de> Deserialize<'de> for Tags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<String, String>::deserialize(deserializer)?;
        Ok(Self::from_pairs(raw, Provenance::User))
    }
}
