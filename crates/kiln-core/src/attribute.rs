//! Attribute combinators.
//!
//! A builder definition does not store plain values: every attribute is
//! wrapped in an [`Attribute`] that says how the value combines with the one
//! inherited from the parent definition. The combinators are independent of
//! the attribute's content; the resolver decides which ones are legal for
//! which attribute shape.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// How a child's attribute value combines with the inherited value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "combine", content = "value")]
pub enum Attribute<T> {
    /// Not declared by this definition; the inherited value passes through.
    #[default]
    Inherit,
    /// The value fully supersedes the inherited one.
    Replace(T),
    /// Items are appended after the inherited items, duplicates dropped.
    Extend(T),
    /// Keys override the inherited keys; removals are explicit.
    Merge(T),
}

impl<T> Attribute<T> {
    pub fn combinator(&self) -> Option<Combinator> {
        match self {
            Attribute::Inherit => None,
            Attribute::Replace(_) => Some(Combinator::Replace),
            Attribute::Extend(_) => Some(Combinator::Extend),
            Attribute::Merge(_) => Some(Combinator::Merge),
        }
    }

    pub fn is_inherit(&self) -> bool {
        matches!(self, Attribute::Inherit)
    }
}

impl<T> From<T> for Attribute<T> {
    fn from(value: T) -> Self {
        Attribute::Replace(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    Replace,
    Extend,
    Merge,
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Combinator::Replace => "replace",
            Combinator::Extend => "extend",
            Combinator::Merge => "merge",
        };
        write!(f, "{}", s)
    }
}

/// Identity used by `Extend` to drop duplicates.
pub trait DedupKey {
    type Key: Eq + Hash;

    fn dedup_key(&self) -> Self::Key;
}

impl DedupKey for String {
    type Key = String;

    fn dedup_key(&self) -> String {
        self.clone()
    }
}

/// Concatenate `base` and `extra`, keeping the first occurrence of each key.
pub fn extend_distinct<T: DedupKey + Clone>(base: &[T], extra: &[T]) -> Vec<T> {
    let mut seen = HashSet::with_capacity(base.len() + extra.len());
    base.iter()
        .chain(extra)
        .filter(|item| seen.insert(item.dedup_key()))
        .cloned()
        .collect()
}

/// Values that know how to overlay themselves during a map merge.
pub trait MergeValue: Clone {
    /// Combine an inherited value with the overriding one. The default is
    /// "overlay wins".
    fn merge_value(&self, overlay: &Self) -> Self {
        overlay.clone()
    }
}

impl MergeValue for String {}

/// JSON objects merge one level deep; everything else is replaced.
impl MergeValue for serde_json::Value {
    fn merge_value(&self, overlay: &Self) -> Self {
        match (self, overlay) {
            (serde_json::Value::Object(base), serde_json::Value::Object(top)) => {
                let mut merged = base.clone();
                for (k, v) in top {
                    merged.insert(k.clone(), v.clone());
                }
                serde_json::Value::Object(merged)
            }
            _ => overlay.clone(),
        }
    }
}

/// Overlay `overrides` onto `base`. A `None` override removes the inherited key.
pub fn merge_maps<V: MergeValue>(
    base: &BTreeMap<String, V>,
    overrides: &BTreeMap<String, Option<V>>,
) -> BTreeMap<String, V> {
    let mut merged = base.clone();
    for (key, value) in overrides {
        match value {
            Some(v) => {
                let next = match merged.get(key) {
                    Some(existing) => existing.merge_value(v),
                    None => v.clone(),
                };
                merged.insert(key.clone(), next);
            }
            None => {
                merged.remove(key);
            }
        }
    }
    merged
}

/// Drop removal sentinels from a map declared with `Replace`.
pub fn present_entries<V: Clone>(map: &BTreeMap<String, Option<V>>) -> BTreeMap<String, V> {
    map.iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
        .collect()
}
