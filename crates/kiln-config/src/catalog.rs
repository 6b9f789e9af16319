//! File-backed resource catalog.

use crate::error::{ConfigError, Result};
use crate::loader::scalar;
use kiln_core::ports::CatalogProvider;
use kiln_core::resource::Resource;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    workers: Vec<ResourceEntry>,
    #[serde(default)]
    images: Vec<ResourceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourceEntry {
    name: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    attributes: Mapping,
}

/// Workers and images read once from a YAML file.
///
/// Every call hands out a copy of the same lists in file order.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    workers: Vec<Resource>,
    images: Vec<Resource>,
}

impl StaticCatalog {
    pub fn new(workers: Vec<Resource>, images: Vec<Resource>) -> Self {
        Self { workers, images }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::parse(&source)?;
        info!(
            path = %path.display(),
            workers = catalog.workers.len(),
            images = catalog.images.len(),
            "Loaded resource catalog"
        );
        Ok(catalog)
    }

    pub fn parse(source: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(source)?;
        Ok(Self {
            workers: resources("worker", file.workers)?,
            images: resources("image", file.images)?,
        })
    }
}

impl CatalogProvider for StaticCatalog {
    fn workers(&self) -> kiln_core::Result<Vec<Resource>> {
        Ok(self.workers.clone())
    }

    fn images(&self) -> kiln_core::Result<Vec<Resource>> {
        Ok(self.images.clone())
    }
}

fn resources(pool: &str, entries: Vec<ResourceEntry>) -> Result<Vec<Resource>> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .map(|entry| {
            if !seen.insert(entry.name.clone()) {
                return Err(ConfigError::InvalidCatalog {
                    entry: entry.name,
                    reason: format!("duplicate {} name", pool),
                });
            }
            let mut attributes = BTreeMap::new();
            flatten(None, &entry.attributes, &mut attributes).map_err(|reason| {
                ConfigError::InvalidCatalog {
                    entry: entry.name.clone(),
                    reason,
                }
            })?;
            Ok(Resource {
                name: entry.name,
                tags: entry.tags.into_iter().collect(),
                attributes,
            })
        })
        .collect()
}

/// Nested maps become dotted keys; `~` leaves the attribute unset.
fn flatten(
    prefix: Option<&str>,
    map: &Mapping,
    out: &mut BTreeMap<String, String>,
) -> std::result::Result<(), String> {
    for (k, v) in map {
        let k = scalar(k)?;
        let key = match prefix {
            Some(prefix) => format!("{}.{}", prefix, k),
            None => k,
        };
        match v {
            Value::Null => {}
            Value::Mapping(nested) => flatten(Some(key.as_str()), nested, out)?,
            other => {
                let value = scalar(other).map_err(|e| format!("attribute {}: {}", key, e))?;
                out.insert(key, value);
            }
        }
    }
    Ok(())
}
