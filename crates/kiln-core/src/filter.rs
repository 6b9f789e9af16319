//! Filter predicates over resources.
//!
//! [`FilterExpr`] is a closed variant type; one interpreter evaluates it.
//! There is no negation and no disjunction beyond `OneOf`, so every
//! eligibility rule reads as a flat conjunction of field predicates.

use crate::resource::Resource;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Field name used by `HasTag` when filters are merged by field.
pub const TAGS_FIELD: &str = "tags";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum FilterExpr {
    /// Attribute present and equal.
    Equals { attr: String, value: String },
    /// Attribute matches a `*` glob anchored at both ends.
    Matches { attr: String, pattern: String },
    /// Attribute is one of `values`; an empty set matches nothing.
    OneOf { attr: String, values: BTreeSet<String> },
    /// Resource carries the tag.
    HasTag { tag: String },
    /// Wildcard for a field; always true.
    Any { attr: String },
    /// Every sub-filter holds; empty is vacuously true.
    All { filters: Vec<FilterExpr> },
}

impl FilterExpr {
    pub fn equals(attr: impl Into<String>, value: impl Into<String>) -> Self {
        FilterExpr::Equals {
            attr: attr.into(),
            value: value.into(),
        }
    }

    pub fn matching(attr: impl Into<String>, pattern: impl Into<String>) -> Self {
        FilterExpr::Matches {
            attr: attr.into(),
            pattern: pattern.into(),
        }
    }

    pub fn any_of<I, S>(attr: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterExpr::OneOf {
            attr: attr.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_tag(tag: impl Into<String>) -> Self {
        FilterExpr::HasTag { tag: tag.into() }
    }

    pub fn wildcard(attr: impl Into<String>) -> Self {
        FilterExpr::Any { attr: attr.into() }
    }

    pub fn all(filters: impl IntoIterator<Item = FilterExpr>) -> Self {
        FilterExpr::All {
            filters: filters.into_iter().collect(),
        }
    }

    /// The field this predicate constrains, if it constrains a single one.
    pub fn field(&self) -> Option<&str> {
        match self {
            FilterExpr::Equals { attr, .. }
            | FilterExpr::Matches { attr, .. }
            | FilterExpr::OneOf { attr, .. }
            | FilterExpr::Any { attr } => Some(attr),
            FilterExpr::HasTag { .. } => Some(TAGS_FIELD),
            FilterExpr::All { .. } => None,
        }
    }

    /// Top-level conjuncts.
    pub fn conjuncts(&self) -> Vec<FilterExpr> {
        match self {
            FilterExpr::All { filters } => filters.clone(),
            other => vec![other.clone()],
        }
    }

    /// Merge `overlay` onto `base` field by field.
    ///
    /// A conjunct of `overlay` replaces the `base` conjuncts constraining the
    /// same field, in place; fields `overlay` does not mention stay as they
    /// are. Dotted names are nested fields: `platform` covers `platform.arch`
    /// and the other way round. Conjuncts without a single field are
    /// appended. An absent base behaves like `All([])`.
    pub fn merge(base: Option<&FilterExpr>, overlay: &FilterExpr) -> FilterExpr {
        let overlay = overlay.conjuncts();

        let mut emitted: HashSet<&str> = HashSet::new();
        let mut merged = Vec::new();
        for conjunct in base.map(FilterExpr::conjuncts).unwrap_or_default() {
            let covering: Vec<&str> = match conjunct.field() {
                Some(field) => overlay
                    .iter()
                    .filter_map(FilterExpr::field)
                    .filter(|key| overlaps(field, key))
                    .collect(),
                None => vec![],
            };
            if covering.is_empty() {
                merged.push(conjunct);
                continue;
            }
            for key in covering {
                if emitted.insert(key) {
                    merged.extend(overlay.iter().filter(|f| f.field() == Some(key)).cloned());
                }
            }
        }
        merged.extend(
            overlay
                .iter()
                .filter(|f| f.field().is_none_or(|field| !emitted.contains(field)))
                .cloned(),
        );

        FilterExpr::All { filters: merged }
    }

    /// Check that the expression compiles.
    pub fn validate(&self) -> Result<(), String> {
        CompiledFilter::compile(self)
            .map(|_| ())
            .map_err(|e| format!("invalid filter {}: {}", self, e))
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Equals { attr, value } => write!(f, "{} == {}", attr, value),
            FilterExpr::Matches { attr, pattern } => write!(f, "{} ~ {}", attr, pattern),
            FilterExpr::OneOf { attr, values } => {
                let values: Vec<&str> = values.iter().map(String::as_str).collect();
                write!(f, "{} in {{{}}}", attr, values.join(", "))
            }
            FilterExpr::HasTag { tag } => write!(f, "has tag {}", tag),
            FilterExpr::Any { attr } => write!(f, "{} == *", attr),
            FilterExpr::All { filters } => {
                let parts: Vec<String> = filters.iter().map(ToString::to_string).collect();
                write!(f, "all({})", parts.join(", "))
            }
        }
    }
}

/// True when one field is the other or nested under it.
fn overlaps(a: &str, b: &str) -> bool {
    let nested = |inner: &str, outer: &str| {
        inner
            .strip_prefix(outer)
            .is_some_and(|rest| rest.starts_with('.'))
    };
    a == b || nested(a, b) || nested(b, a)
}

/// Translate a `*` glob into an anchored regular expression.
fn glob_to_regex(pattern: &str) -> String {
    let parts: Vec<String> = pattern.split('*').map(regex::escape).collect();
    format!("(?s)^{}$", parts.join(".*"))
}

/// A filter with its glob patterns compiled, for evaluation across a catalog.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    node: Node,
}

#[derive(Debug, Clone)]
enum Node {
    Equals { attr: String, value: String },
    Matches { attr: String, regex: Regex },
    OneOf { attr: String, values: BTreeSet<String> },
    HasTag(String),
    Always,
    All(Vec<Node>),
}

impl CompiledFilter {
    pub fn compile(expr: &FilterExpr) -> Result<Self, regex::Error> {
        Ok(Self {
            node: Self::compile_node(expr)?,
        })
    }

    /// A filter that accepts everything; used when a definition has none.
    pub fn accept_all() -> Self {
        Self { node: Node::Always }
    }

    fn compile_node(expr: &FilterExpr) -> Result<Node, regex::Error> {
        Ok(match expr {
            FilterExpr::Equals { attr, value } => Node::Equals {
                attr: attr.clone(),
                value: value.clone(),
            },
            FilterExpr::Matches { attr, pattern } => Node::Matches {
                attr: attr.clone(),
                regex: Regex::new(&glob_to_regex(pattern))?,
            },
            FilterExpr::OneOf { attr, values } => Node::OneOf {
                attr: attr.clone(),
                values: values.clone(),
            },
            FilterExpr::HasTag { tag } => Node::HasTag(tag.clone()),
            FilterExpr::Any { .. } => Node::Always,
            FilterExpr::All { filters } => Node::All(
                filters
                    .iter()
                    .map(Self::compile_node)
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        Self::eval(&self.node, resource)
    }

    fn eval(node: &Node, resource: &Resource) -> bool {
        match node {
            Node::Equals { attr, value } => resource.attribute(attr) == Some(value.as_str()),
            Node::Matches { attr, regex } => resource
                .attribute(attr)
                .is_some_and(|actual| regex.is_match(actual)),
            Node::OneOf { attr, values } => resource
                .attribute(attr)
                .is_some_and(|actual| values.contains(actual)),
            Node::HasTag(tag) => resource.has_tag(tag),
            Node::Always => true,
            Node::All(nodes) => nodes.iter().all(|n| Self::eval(n, resource)),
        }
    }
}

/// Evaluate a filter against one resource.
///
/// Unknown attributes do not match; they are never an error.
pub fn matches(expr: &FilterExpr, resource: &Resource) -> bool {
    CompiledFilter::compile(expr).is_ok_and(|f| f.matches(resource))
}

/// A leaf predicate that rejected a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub predicate: FilterExpr,
    /// What the resource had for the predicate's field.
    pub actual: Option<String>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.actual {
            Some(actual) => write!(f, "expected {}, found {}", self.predicate, actual),
            None => write!(f, "expected {}, found nothing", self.predicate),
        }
    }
}

/// List every leaf predicate of `expr` that `resource` fails.
pub fn explain(expr: &FilterExpr, resource: &Resource) -> Vec<Mismatch> {
    let mut out = Vec::new();
    collect_mismatches(expr, resource, &mut out);
    out
}

fn collect_mismatches(expr: &FilterExpr, resource: &Resource, out: &mut Vec<Mismatch>) {
    match expr {
        FilterExpr::All { filters } => {
            for f in filters {
                collect_mismatches(f, resource, out);
            }
        }
        FilterExpr::HasTag { .. } => {
            if !matches(expr, resource) {
                let tags: Vec<&str> = resource.tags.iter().map(String::as_str).collect();
                out.push(Mismatch {
                    predicate: expr.clone(),
                    actual: (!tags.is_empty()).then(|| tags.join(",")),
                });
            }
        }
        leaf => {
            if !matches(leaf, resource) {
                out.push(Mismatch {
                    predicate: leaf.clone(),
                    actual: leaf
                        .field()
                        .and_then(|field| resource.attribute(field))
                        .map(str::to_string),
                });
            }
        }
    }
}
