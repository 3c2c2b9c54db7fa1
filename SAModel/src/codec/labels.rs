//! Structure names keyed by written address

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Name-to-address map emitted by encoders and consumed by decoders.
///
/// Addresses are absolute (image base included). Decoders look names up by
/// address and fall back to a synthesized `kind_XXXXXXXX` name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IndexMap<String, u32>", into = "IndexMap<String, u32>")]
pub struct LabelMap {
    by_name: IndexMap<String, u32>,
    by_address: HashMap<u32, String>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a label. Names are unique; an address keeps its first name.
    pub fn insert(&mut self, name: impl Into<String>, address: u32) {
        let name = name.into();
        self.by_address.entry(address).or_insert_with(|| name.clone());
        self.by_name.entry(name).or_insert(address);
    }

    pub fn address_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn name_at(&self, address: u32) -> Option<&str> {
        self.by_address.get(&address).map(String::as_str)
    }

    /// Name at `address`, or `{prefix}_{address:08X}`.
    pub fn name_or(&self, address: u32, prefix: &str) -> String {
        self.name_at(address)
            .map_or_else(|| format!("{prefix}_{address:08X}"), str::to_string)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Labels in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.by_name.iter().map(|(name, &address)| (name.as_str(), address))
    }
}

impl From<IndexMap<String, u32>> for LabelMap {
    fn from(map: IndexMap<String, u32>) -> Self {
        let mut labels = LabelMap::new();
        for (name, address) in map {
            labels.insert(name, address);
        }
        labels
    }
}

impl From<LabelMap> for IndexMap<String, u32> {
    fn from(labels: LabelMap) -> Self {
        labels.by_name
    }
}

impl FromIterator<(String, u32)> for LabelMap {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        let mut labels = LabelMap::new();
        for (name, address) in iter {
            labels.insert(name, address);
        }
        labels
    }
}
