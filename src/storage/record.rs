//! Metadata Record
//!
//! A loosely-typed, ordered `field -> value` mapping attached to exactly one
//! filesystem entry. Unknown keys pass through untouched; the helpers below
//! only give names to the well-known integrity and provenance fields.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix marking an externally asserted (reference) value
pub const RDS_PREFIX: &str = "RDS ";

/// Keys naming the entry itself; never persisted
pub const FILENAME_KEYS: &[&str] = &["Filename", "File name"];

pub const VERSION_KEY: &str = "Version";
pub const UPLOADER_KEY: &str = "Uploader";

/// Ordered string-to-string metadata mapping
///
/// Serialized as a plain JSON object. `BTreeMap` keeps the sidecar output
/// stable across writes, so an unchanged record produces an unchanged file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataRecord(BTreeMap<String, String>);

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Overlay `other` onto `self`; `other` wins on key collision
    pub fn merge(&mut self, other: MetadataRecord) {
        self.0.extend(other.0);
    }

    /// The filename-equivalent value, under either spelling
    pub fn filename(&self) -> Option<&str> {
        FILENAME_KEYS.iter().find_map(|key| self.get(key))
    }

    /// Drop every filename-equivalent key, bare or `RDS `-prefixed
    pub fn strip_filename(&mut self) {
        for key in FILENAME_KEYS {
            self.0.remove(*key);
            self.0.remove(&format!("{}{}", RDS_PREFIX, key));
        }
    }

    /// Copy of this record with every key prefixed by `RDS `
    pub fn with_reference_prefix(&self) -> MetadataRecord {
        self.0
            .iter()
            .map(|(k, v)| (format!("{}{}", RDS_PREFIX, k), v.clone()))
            .collect()
    }

    /// Reference value asserted for `field`, i.e. the `RDS <field>` entry
    pub fn reference(&self, field: &str) -> Option<&str> {
        self.get(&format!("{}{}", RDS_PREFIX, field))
    }
}

impl FromIterator<(String, String)> for MetadataRecord {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for MetadataRecord {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect()
    }
}

impl IntoIterator for MetadataRecord {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
