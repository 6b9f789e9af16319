//! Builder definition types.
//!
//! A [`BuilderDefinition`] is a delta over its parent: every attribute carries
//! the combinator that folds it onto the inherited value. Ancestry is by
//! name, looked up in a [`DefinitionSet`].

use crate::attribute::{Attribute, DedupKey};
use crate::filter::FilterExpr;
use crate::ids::{BuilderName, CommandKind};
use crate::property::PropertyValue;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tool-specific step configuration, passed through untouched.
pub type ConfigValue = serde_json::Value;

/// Map attribute as declared: `None` removes an inherited key under `Merge`.
pub type DeclaredMap<V> = BTreeMap<String, Option<V>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepSpec {
    pub name: String,
    pub command_kind: CommandKind,
    #[serde(default = "default_workdir")]
    pub workdir: String,
    #[serde(default)]
    pub args: Vec<PropertyValue>,
    #[serde(default)]
    pub env: BTreeMap<String, PropertyValue>,
    #[serde(default)]
    pub extra: BTreeMap<String, ConfigValue>,
}

fn default_workdir() -> String {
    ".".to_string()
}

impl StepSpec {
    pub fn new(name: impl Into<String>, command_kind: impl Into<CommandKind>) -> Self {
        Self {
            name: name.into(),
            command_kind: command_kind.into(),
            workdir: default_workdir(),
            args: vec![],
            env: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn in_dir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<PropertyValue>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Steps are identified by `(name, workdir)`.
impl DedupKey for StepSpec {
    type Key = (String, String);

    fn dedup_key(&self) -> (String, String) {
        (self.name.clone(), self.workdir.clone())
    }
}

/// A named template for a CI job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct BuilderDefinition {
    pub name: BuilderName,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent: Option<BuilderName>,
    #[serde(default)]
    pub tags: Attribute<Vec<String>>,
    #[serde(default)]
    pub steps: Attribute<Vec<StepSpec>>,
    #[serde(default)]
    pub properties: Attribute<DeclaredMap<PropertyValue>>,
    #[serde(default)]
    pub env: Attribute<DeclaredMap<PropertyValue>>,
    #[serde(default)]
    pub volumes: Attribute<Vec<PropertyValue>>,
    #[serde(default)]
    pub host_config: Attribute<DeclaredMap<ConfigValue>>,
    #[serde(default)]
    pub worker_filter: Attribute<FilterExpr>,
    #[serde(default)]
    pub image_filter: Attribute<FilterExpr>,
}

impl BuilderDefinition {
    pub fn new(name: impl Into<BuilderName>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent: impl Into<BuilderName>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// All definitions known at configuration-load time, ordered by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct DefinitionSet {
    definitions: BTreeMap<BuilderName, BuilderDefinition>,
}

impl DefinitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition, returning the one it replaced.
    pub fn insert(&mut self, definition: BuilderDefinition) -> Option<BuilderDefinition> {
        self.definitions.insert(definition.name.clone(), definition)
    }

    pub fn get(&self, name: &str) -> Option<&BuilderDefinition> {
        self.definitions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &BuilderName> {
        self.definitions.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuilderDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl FromIterator<BuilderDefinition> for DefinitionSet {
    fn from_iter<I: IntoIterator<Item = BuilderDefinition>>(iter: I) -> Self {
        let mut set = DefinitionSet::new();
        for definition in iter {
            set.insert(definition);
        }
        set
    }
}
