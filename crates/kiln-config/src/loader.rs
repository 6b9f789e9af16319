//! YAML builder definition loading.
//!
//! Definition files map builder names to attribute blocks. Attribute values
//! may carry a combinator tag (`!replace`, `!extend`, `!merge`); untagged
//! values replace. Filter blocks and property values use their own tags,
//! see [`filter`] and [`property_value`].

use crate::error::{ConfigError, Result};
use crate::graph::AncestryGraph;
use kiln_core::assembler::builder_root;
use kiln_core::attribute::{Attribute, Combinator};
use kiln_core::definition::{BuilderDefinition, ConfigValue, DeclaredMap, DefinitionSet, StepSpec};
use kiln_core::filter::{FilterExpr, TAGS_FIELD};
use kiln_core::ids::BuilderName;
use kiln_core::property::PropertyValue;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

type Parsed<T> = std::result::Result<T, String>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionFile {
    #[serde(default)]
    builders: BTreeMap<String, Value>,
}

/// Load and validate a definition file.
pub fn load_definitions(path: &Path) -> Result<DefinitionSet> {
    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let set = parse_definitions(&source)?;
    info!(path = %path.display(), builders = set.len(), "Loaded builder definitions");
    Ok(set)
}

/// Parse definitions from YAML text and validate the ancestry graph.
pub fn parse_definitions(source: &str) -> Result<DefinitionSet> {
    let file: DefinitionFile = serde_yaml::from_str(source)?;
    let set = file
        .builders
        .iter()
        .map(|(name, value)| builder(name, value))
        .collect::<Result<DefinitionSet>>()?;

    let graph = AncestryGraph::build(&set)?;
    debug!(roots = graph.roots().len(), "Validated builder ancestry");
    Ok(set)
}

fn builder(name: &str, value: &Value) -> Result<BuilderDefinition> {
    if builder_root("/", name).is_none() {
        return Err(ConfigError::builder(
            name,
            "",
            "builder names must be a single path segment",
        ));
    }
    let mut def = BuilderDefinition::new(name);
    let fields = match value {
        Value::Null => return Ok(def),
        Value::Mapping(fields) => fields,
        other => {
            return Err(ConfigError::builder(
                name,
                "",
                format!("expected a mapping, found {}", kind(other)),
            ));
        }
    };

    for (key, value) in fields {
        let field = key
            .as_str()
            .ok_or_else(|| ConfigError::builder(name, "", "field names must be strings"))?;
        let invalid = |reason: String| ConfigError::builder(name, field, reason);

        match field {
            "description" => def.description = Some(scalar(value).map_err(invalid)?),
            "parent" => def.parent = Some(BuilderName::new(scalar(value).map_err(invalid)?)),
            "tags" => def.tags = combined(value, |v| sequence(v, scalar)).map_err(invalid)?,
            "steps" => def.steps = combined(value, |v| sequence(v, step)).map_err(invalid)?,
            "properties" => def.properties = combined(value, declared_map).map_err(invalid)?,
            "env" => def.env = combined(value, declared_map).map_err(invalid)?,
            "volumes" => {
                def.volumes = combined(value, |v| sequence(v, property_value)).map_err(invalid)?
            }
            "host_config" => def.host_config = combined(value, host_config).map_err(invalid)?,
            "worker_filter" => def.worker_filter = combined(value, filter).map_err(invalid)?,
            "image_filter" => def.image_filter = combined(value, filter).map_err(invalid)?,
            other => return Err(ConfigError::builder(name, other, "unknown field")),
        }
    }
    Ok(def)
}

/// Split an optional combinator tag off a value.
fn combinator(value: &Value) -> (Combinator, &Value) {
    if let Value::Tagged(tagged) = value {
        for c in [Combinator::Replace, Combinator::Extend, Combinator::Merge] {
            if tagged.tag == c.to_string() {
                return (c, &tagged.value);
            }
        }
    }
    (Combinator::Replace, value)
}

fn combined<T>(value: &Value, parse: impl Fn(&Value) -> Parsed<T>) -> Parsed<Attribute<T>> {
    let (c, inner) = combinator(value);
    let parsed = parse(inner)?;
    Ok(match c {
        Combinator::Replace => Attribute::Replace(parsed),
        Combinator::Extend => Attribute::Extend(parsed),
        Combinator::Merge => Attribute::Merge(parsed),
    })
}

fn kind(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(_) => "a number".to_string(),
        Value::String(_) => "a string".to_string(),
        Value::Sequence(_) => "a sequence".to_string(),
        Value::Mapping(_) => "a mapping".to_string(),
        Value::Tagged(tagged) => format!("tag {}", tagged.tag),
    }
}

/// Strings, numbers and booleans, as text.
pub(crate) fn scalar(value: &Value) -> Parsed<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected a scalar, found {}", kind(other))),
    }
}

fn sequence<T>(value: &Value, item: impl Fn(&Value) -> Parsed<T>) -> Parsed<Vec<T>> {
    match value {
        Value::Sequence(items) => items.iter().map(item).collect(),
        other => Err(format!("expected a sequence, found {}", kind(other))),
    }
}

fn mapping(value: &Value) -> Parsed<&Mapping> {
    match value {
        Value::Mapping(map) => Ok(map),
        other => Err(format!("expected a mapping, found {}", kind(other))),
    }
}

fn key(key: &Value) -> Parsed<String> {
    scalar(key).map_err(|e| format!("invalid key: {}", e))
}

/// Scalar literal, `!prop name`, `!prop {name, default}` or `!interpolate "..."`.
pub fn property_value(value: &Value) -> Parsed<PropertyValue> {
    let Value::Tagged(tagged) = value else {
        return scalar(value).map(PropertyValue::Literal);
    };
    if tagged.tag == "prop" {
        match &tagged.value {
            Value::Mapping(map) => {
                let name = map
                    .get("name")
                    .ok_or("!prop needs a name")
                    .and_then(|v| scalar(v).map_err(|_| "!prop name must be a scalar"))?;
                let default = match map.get("default") {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(scalar(v)?),
                };
                let unexpected = map
                    .iter()
                    .map(|(k, _)| k)
                    .find(|k| !matches!(k.as_str(), Some("name" | "default")));
                if let Some(extra) = unexpected {
                    return Err(format!("unexpected !prop key {:?}", extra));
                }
                Ok(PropertyValue::Property { name, default })
            }
            other => Ok(PropertyValue::property(scalar(other)?, None)),
        }
    } else if tagged.tag == "interpolate" {
        Ok(PropertyValue::Interpolate(scalar(&tagged.value)?))
    } else {
        Err(format!("unknown property tag {}", tagged.tag))
    }
}

/// A map whose `~` values remove inherited keys.
fn declared_map(value: &Value) -> Parsed<DeclaredMap<PropertyValue>> {
    mapping(value)?
        .iter()
        .map(|(k, v)| -> Parsed<(String, Option<PropertyValue>)> {
            let k = key(k)?;
            let v = match v {
                Value::Null => None,
                v => Some(property_value(v).map_err(|e| format!("{}: {}", k, e))?),
            };
            Ok((k, v))
        })
        .collect()
}

fn host_config(value: &Value) -> Parsed<DeclaredMap<ConfigValue>> {
    mapping(value)?
        .iter()
        .map(|(k, v)| -> Parsed<(String, Option<ConfigValue>)> {
            let k = key(k)?;
            let v = match v {
                Value::Null => None,
                v => Some(serde_json::to_value(v).map_err(|e| format!("{}: {}", k, e))?),
            };
            Ok((k, v))
        })
        .collect()
}

fn step(value: &Value) -> Parsed<StepSpec> {
    let map = mapping(value)?;
    let required = |field: &str| -> Parsed<String> {
        map.get(field)
            .ok_or_else(|| format!("step is missing '{}'", field))
            .and_then(scalar)
    };
    let mut step = StepSpec::new(required("name")?, required("kind")?);
    let context = |e: String| format!("step '{}': {}", step.name, e);

    let mut workdir = None;
    let mut args = Vec::new();
    let mut env = BTreeMap::new();
    let mut extra = BTreeMap::new();
    for (k, v) in map {
        let k = key(k)?;
        match k.as_str() {
            "name" | "kind" => {}
            "workdir" => workdir = Some(scalar(v).map_err(context)?),
            "args" => args = sequence(v, property_value).map_err(context)?,
            "env" => {
                for (name, value) in mapping(v).map_err(context)? {
                    env.insert(key(name)?, property_value(value).map_err(context)?);
                }
            }
            _ => {
                let json = serde_json::to_value(v).map_err(|e| context(e.to_string()))?;
                extra.insert(k, json);
            }
        }
    }

    if let Some(workdir) = workdir {
        step.workdir = workdir;
    }
    step.args = args;
    step.env = env;
    step.extra = extra;
    Ok(step)
}

/// A filter block: one conjunct per field.
///
/// Scalars compare for equality, `~` matches anything, `!glob`, `!one_of`
/// and `!has` select the other predicates, and nested maps flatten to dotted
/// attribute names.
pub fn filter(value: &Value) -> Parsed<FilterExpr> {
    let mut conjuncts = Vec::new();
    match value {
        Value::Null => {}
        Value::Mapping(map) => collect_conjuncts(None, map, &mut conjuncts)?,
        other => return Err(format!("expected a filter mapping, found {}", kind(other))),
    }
    let expr = FilterExpr::all(conjuncts);
    expr.validate()?;
    Ok(expr)
}

fn collect_conjuncts(prefix: Option<&str>, map: &Mapping, out: &mut Vec<FilterExpr>) -> Parsed<()> {
    for (k, v) in map {
        let k = key(k)?;
        let field = match prefix {
            Some(prefix) => format!("{}.{}", prefix, k),
            None => k,
        };
        match v {
            Value::Null => out.push(FilterExpr::wildcard(field)),
            Value::Mapping(nested) => collect_conjuncts(Some(field.as_str()), nested, out)?,
            Value::Sequence(_) => {
                return Err(format!("{}: use !one_of for a set of alternatives", field));
            }
            Value::Tagged(tagged) if tagged.tag == "glob" => {
                out.push(FilterExpr::matching(&field, scalar(&tagged.value)?));
            }
            Value::Tagged(tagged) if tagged.tag == "one_of" => {
                out.push(FilterExpr::any_of(&field, sequence(&tagged.value, scalar)?));
            }
            Value::Tagged(tagged) if tagged.tag == "has" => {
                if field != TAGS_FIELD {
                    return Err(format!("!has is only valid under '{}'", TAGS_FIELD));
                }
                match &tagged.value {
                    Value::Sequence(_) => out.extend(
                        sequence(&tagged.value, scalar)?
                            .into_iter()
                            .map(FilterExpr::has_tag),
                    ),
                    single => out.push(FilterExpr::has_tag(scalar(single)?)),
                }
            }
            Value::Tagged(tagged) => {
                return Err(format!("{}: unknown filter tag {}", field, tagged.tag));
            }
            scalar_value => out.push(FilterExpr::equals(&field, scalar(scalar_value)?)),
        }
    }
    Ok(())
}
