//! Two-phase property values.
//!
//! Definitions carry unresolved [`PropertyValue`]s; they become strings only
//! when the pipeline assembler renders them against a [`PropertyTable`] built
//! for one concrete job.

use crate::attribute::{DedupKey, MergeValue};
use crate::{Error, Result};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\$\{\{\s*([^}]+?)\s*\}\}"));

fn placeholder() -> Result<&'static Regex> {
    PLACEHOLDER.as_ref().map_err(|e| Error::Pattern(e.clone()))
}

/// Property names the assembler always provides.
pub mod builtin {
    /// Absolute job root directory.
    pub const BUILDDIR: &str = "builddir";
    /// Name of the worker the job was bound to.
    pub const WORKERNAME: &str = "workername";
    /// Name of the image the job was bound to.
    pub const IMAGENAME: &str = "imagename";
    /// Name of the builder the job was assembled from.
    pub const BUILDERNAME: &str = "buildername";
}

/// An unresolved value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    /// Used verbatim.
    Literal(String),
    /// Looked up by name, falling back to `default`.
    Property {
        name: String,
        #[serde(default)]
        default: Option<String>,
    },
    /// Template with `${{ name }}` placeholders.
    Interpolate(String),
}

impl PropertyValue {
    pub fn literal(value: impl Into<String>) -> Self {
        PropertyValue::Literal(value.into())
    }

    pub fn property(name: impl Into<String>, default: Option<&str>) -> Self {
        PropertyValue::Property {
            name: name.into(),
            default: default.map(str::to_string),
        }
    }

    pub fn interpolate(template: impl Into<String>) -> Self {
        PropertyValue::Interpolate(template.into())
    }

    /// Property names this value reads.
    pub fn references(&self) -> Result<Vec<String>> {
        Ok(match self {
            PropertyValue::Literal(_) => vec![],
            PropertyValue::Property { name, .. } => vec![name.clone()],
            PropertyValue::Interpolate(template) => placeholder()?
                .captures_iter(template)
                .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
                .collect(),
        })
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::literal(s)
    }
}

impl DedupKey for PropertyValue {
    type Key = PropertyValue;

    fn dedup_key(&self) -> PropertyValue {
        self.clone()
    }
}

impl MergeValue for PropertyValue {}

/// Concrete property values for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyTable {
    values: BTreeMap<String, String>,
}

impl PropertyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table for a job.
    ///
    /// Precedence, lowest first: declared builder properties, builtin job
    /// properties, caller overrides. Declared values are rendered in
    /// dependency order, so one declared property may read another. A
    /// declared value that cannot be satisfied leaves its property unset;
    /// references that loop back on each other are an error. A property
    /// reading its own name sees only the layers above it.
    pub fn layered(
        declared: &BTreeMap<String, PropertyValue>,
        builtins: &BTreeMap<String, String>,
        overrides: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let mut table = PropertyTable::new();
        table.extend(builtins);
        table.extend(overrides);

        let mut pending: BTreeMap<&str, (&PropertyValue, Vec<String>)> = BTreeMap::new();
        for (key, value) in declared {
            if table.get(key).is_none() {
                pending.insert(key.as_str(), (value, value.references()?));
            }
        }

        while !pending.is_empty() {
            let ready: Vec<&str> = pending
                .iter()
                .filter(|(key, (_, refs))| {
                    refs.iter()
                        .all(|r| r == **key || !pending.contains_key(r.as_str()))
                })
                .map(|(key, _)| *key)
                .collect();
            if ready.is_empty() {
                return Err(Error::CyclicProperty {
                    properties: pending.keys().map(|k| k.to_string()).collect(),
                });
            }
            for key in ready {
                if let Some((value, _)) = pending.remove(key) {
                    if let Ok(rendered) = table.render(value, key) {
                        table.insert(key, rendered);
                    }
                }
            }
        }
        Ok(table)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn extend(&mut self, other: &BTreeMap<String, String>) {
        for (k, v) in other {
            self.values.insert(k.clone(), v.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.values
    }

    /// Render a value; `context` names the consumer for error messages.
    pub fn render(&self, value: &PropertyValue, context: &str) -> Result<String> {
        match value {
            PropertyValue::Literal(s) => Ok(s.clone()),
            PropertyValue::Property { name, default } => self
                .get(name)
                .map(str::to_string)
                .or_else(|| default.clone())
                .ok_or_else(|| Error::UnresolvedProperty {
                    property: name.clone(),
                    context: context.to_string(),
                }),
            PropertyValue::Interpolate(template) => self.interpolate(template, context),
        }
    }

    fn interpolate(&self, template: &str, context: &str) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in placeholder()?.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = self.get(name.as_str()).ok_or_else(|| Error::UnresolvedProperty {
                property: name.as_str().to_string(),
                context: context.to_string(),
            })?;
            out.push_str(&template[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }
}
