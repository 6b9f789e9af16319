//! Definition resolution.
//!
//! Resolution walks a definition's ancestry (most general first) and folds
//! each attribute with the combinator the definition attached to it. The
//! fold works on borrowed, immutable definitions and builds a fresh
//! [`ResolvedDefinition`]; an error discards everything built so far.

use crate::attribute::{Attribute, Combinator, DedupKey, MergeValue};
use crate::attribute::{extend_distinct, merge_maps, present_entries};
use crate::definition::{BuilderDefinition, ConfigValue, DeclaredMap, DefinitionSet, StepSpec};
use crate::filter::FilterExpr;
use crate::ids::BuilderName;
use crate::property::PropertyValue;
use crate::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A flat, concrete builder definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ResolvedDefinition {
    pub name: BuilderName,
    #[serde(default)]
    pub description: Option<String>,
    /// Definitions folded into this one, root first.
    pub ancestry: Vec<BuilderName>,
    pub tags: Vec<String>,
    pub steps: Vec<StepSpec>,
    pub properties: BTreeMap<String, PropertyValue>,
    pub env: BTreeMap<String, PropertyValue>,
    pub volumes: Vec<PropertyValue>,
    pub host_config: BTreeMap<String, ConfigValue>,
    /// `None` accepts every worker.
    pub worker_filter: Option<FilterExpr>,
    /// `None` accepts every image.
    pub image_filter: Option<FilterExpr>,
}

impl ResolvedDefinition {
    /// Fold one more definition onto this value.
    ///
    /// `position` is the definition's index in the ancestry chain and only
    /// feeds error messages.
    pub fn apply(&self, delta: &BuilderDefinition, position: usize) -> Result<Self> {
        let fail = |attribute: &str, reason: String| Error::AttributeResolution {
            definition: delta.name.to_string(),
            attribute: attribute.to_string(),
            position,
            reason,
        };

        let mut ancestry = self.ancestry.clone();
        ancestry.push(delta.name.clone());

        Ok(Self {
            name: delta.name.clone(),
            description: delta.description.clone().or_else(|| self.description.clone()),
            ancestry,
            tags: fold_set(&self.tags, &delta.tags).map_err(|r| fail("tags", r))?,
            steps: fold_list(&self.steps, &delta.steps).map_err(|r| fail("steps", r))?,
            properties: fold_map(&self.properties, &delta.properties)
                .map_err(|r| fail("properties", r))?,
            env: fold_map(&self.env, &delta.env).map_err(|r| fail("env", r))?,
            volumes: fold_list(&self.volumes, &delta.volumes).map_err(|r| fail("volumes", r))?,
            host_config: fold_map(&self.host_config, &delta.host_config)
                .map_err(|r| fail("host_config", r))?,
            worker_filter: fold_filter(&self.worker_filter, &delta.worker_filter)
                .map_err(|r| fail("worker_filter", r))?,
            image_filter: fold_filter(&self.image_filter, &delta.image_filter)
                .map_err(|r| fail("image_filter", r))?,
        })
    }

    pub fn step(&self, name: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

fn unsupported(combinator: Combinator, shape: &str) -> String {
    format!("{} is not valid for a {} attribute", combinator, shape)
}

fn fold_list<T: DedupKey + Clone>(
    base: &[T],
    attr: &Attribute<Vec<T>>,
) -> std::result::Result<Vec<T>, String> {
    match attr {
        Attribute::Inherit => Ok(base.to_vec()),
        Attribute::Replace(items) => Ok(items.clone()),
        Attribute::Extend(items) => Ok(extend_distinct(base, items)),
        Attribute::Merge(_) => Err(unsupported(Combinator::Merge, "list")),
    }
}

/// Tags are a set: a replacing list drops its own repeats too.
fn fold_set<T: DedupKey + Clone>(
    base: &[T],
    attr: &Attribute<Vec<T>>,
) -> std::result::Result<Vec<T>, String> {
    fold_list(base, attr).map(|items| extend_distinct(&[], &items))
}

fn fold_map<V: MergeValue>(
    base: &BTreeMap<String, V>,
    attr: &Attribute<DeclaredMap<V>>,
) -> std::result::Result<BTreeMap<String, V>, String> {
    match attr {
        Attribute::Inherit => Ok(base.clone()),
        Attribute::Replace(map) => Ok(present_entries(map)),
        Attribute::Merge(map) => Ok(merge_maps(base, map)),
        Attribute::Extend(_) => Err(unsupported(Combinator::Extend, "map")),
    }
}

fn fold_filter(
    base: &Option<FilterExpr>,
    attr: &Attribute<FilterExpr>,
) -> std::result::Result<Option<FilterExpr>, String> {
    let folded = match attr {
        Attribute::Inherit => return Ok(base.clone()),
        Attribute::Replace(filter) => filter.clone(),
        Attribute::Merge(filter) => FilterExpr::merge(base.as_ref(), filter),
        Attribute::Extend(_) => return Err(unsupported(Combinator::Extend, "filter")),
    };
    folded.validate()?;
    Ok(Some(folded))
}

/// Resolve an explicit chain, root first.
pub fn resolve_chain(chain: &[&BuilderDefinition]) -> Result<ResolvedDefinition> {
    chain
        .iter()
        .enumerate()
        .try_fold(ResolvedDefinition::default(), |acc, (position, def)| {
            acc.apply(def, position)
        })
}

/// Resolves definitions by name against a [`DefinitionSet`].
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    definitions: &'a DefinitionSet,
}

impl<'a> Resolver<'a> {
    pub fn new(definitions: &'a DefinitionSet) -> Self {
        Self { definitions }
    }

    /// The ancestry chain of `definition`, root first.
    ///
    /// Fails on an unknown parent or when a definition is revisited.
    pub fn ancestry<'d>(
        &self,
        definition: &'d BuilderDefinition,
    ) -> Result<Vec<&'d BuilderDefinition>>
    where
        'a: 'd,
    {
        let mut chain = vec![definition];
        let mut visited = vec![definition.name.to_string()];
        let mut current = definition;

        while let Some(parent_name) = &current.parent {
            if visited.iter().any(|v| v == parent_name.as_str()) {
                visited.push(parent_name.to_string());
                return Err(Error::CyclicAncestry {
                    definition: parent_name.to_string(),
                    chain: visited,
                });
            }
            let parent = self
                .definitions
                .get(parent_name.as_str())
                .ok_or_else(|| Error::UnknownParent {
                    definition: current.name.to_string(),
                    parent: parent_name.to_string(),
                })?;
            visited.push(parent.name.to_string());
            chain.push(parent);
            current = parent;
        }

        chain.reverse();
        Ok(chain)
    }

    /// Resolve a definition that may or may not belong to the set; its
    /// ancestors are looked up by name.
    pub fn resolve_definition(&self, definition: &BuilderDefinition) -> Result<ResolvedDefinition> {
        let chain = self.ancestry(definition)?;
        resolve_chain(&chain)
    }

    pub fn resolve(&self, name: &str) -> Result<ResolvedDefinition> {
        let definition = self
            .definitions
            .get(name)
            .ok_or_else(|| Error::UnknownDefinition(name.to_string()))?;
        self.resolve_definition(definition)
    }

    /// Resolve every definition in name order; the first failure aborts.
    pub fn resolve_all(&self) -> Result<Vec<ResolvedDefinition>> {
        self.definitions
            .iter()
            .map(|d| self.resolve_definition(d))
            .collect()
    }
}
