//! Workers and images offered by the catalog.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Attribute key that always resolves to the resource name.
pub const NAME_ATTRIBUTE: &str = "name";

/// A worker machine or a container image. Read-only input; the catalog
/// hands out a fresh snapshot on every matching request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Resource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up an attribute; `name` falls back to the resource name.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        match self.attributes.get(key) {
            Some(v) => Some(v.as_str()),
            None if key == NAME_ATTRIBUTE => Some(self.name.as_str()),
            None => None,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Point-in-time view of the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub workers: Vec<Resource>,
    #[serde(default)]
    pub images: Vec<Resource>,
}

impl CatalogSnapshot {
    pub fn new(workers: Vec<Resource>, images: Vec<Resource>) -> Self {
        Self { workers, images }
    }
}
