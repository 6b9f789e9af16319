//! Pipeline assembly.
//!
//! Binds a resolved definition to one `(worker, image)` pair and renders
//! everything the execution engine needs: ordered steps, per-step
//! environments, working directories under a single job root. Nothing is
//! executed here.

use crate::definition::ConfigValue;
use crate::ids::{BuilderName, CommandKind};
use crate::property::{PropertyTable, PropertyValue, builtin};
use crate::resolver::ResolvedDefinition;
use crate::resource::Resource;
use crate::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One step, ready to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobStep {
    /// Position in the pipeline, from zero.
    pub index: usize,
    pub name: String,
    pub command_kind: CommandKind,
    /// Absolute working directory under the job root.
    pub workdir: String,
    pub args: Vec<String>,
    /// Job environment overlaid with the step's own.
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub extra: BTreeMap<String, ConfigValue>,
}

/// What to run, where, in what order, with what environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobDescription {
    pub builder: BuilderName,
    pub ancestry: Vec<BuilderName>,
    pub worker: String,
    pub image: String,
    pub tags: Vec<String>,
    pub job_root: String,
    pub properties: BTreeMap<String, String>,
    pub volumes: Vec<String>,
    pub host_config: BTreeMap<String, ConfigValue>,
    pub steps: Vec<JobStep>,
}

impl JobDescription {
    pub fn step(&self, name: &str) -> Option<&JobStep> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Materializes [`JobDescription`]s under one job root.
#[derive(Debug, Clone)]
pub struct PipelineAssembler {
    job_root: String,
    overrides: BTreeMap<String, String>,
}

impl PipelineAssembler {
    pub fn new(job_root: impl Into<String>) -> Self {
        Self {
            job_root: job_root.into(),
            overrides: BTreeMap::new(),
        }
    }

    /// Caller-supplied properties; they win over everything else.
    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.overrides.extend(properties);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    pub fn job_root(&self) -> &str {
        &self.job_root
    }

    pub fn assemble(
        &self,
        resolved: &ResolvedDefinition,
        (worker, image): (&Resource, &Resource),
    ) -> Result<JobDescription> {
        let builtins: BTreeMap<String, String> = [
            (builtin::BUILDDIR, self.job_root.as_str()),
            (builtin::WORKERNAME, worker.name.as_str()),
            (builtin::IMAGENAME, image.name.as_str()),
            (builtin::BUILDERNAME, resolved.name.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let table = PropertyTable::layered(&resolved.properties, &builtins, &self.overrides)?;

        let volumes = resolved
            .volumes
            .iter()
            .enumerate()
            .map(|(i, v)| table.render(v, &format!("volume {}", i)))
            .collect::<Result<Vec<_>>>()?;

        let steps = resolved
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| -> Result<JobStep> {
                let context = |what: String| format!("step '{}' {}", step.name, what);

                let mut env: BTreeMap<&String, &PropertyValue> = resolved.env.iter().collect();
                env.extend(step.env.iter());
                let env = env
                    .into_iter()
                    .map(|(k, v)| -> Result<(String, String)> {
                        Ok((k.clone(), table.render(v, &context(format!("env {}", k)))?))
                    })
                    .collect::<Result<BTreeMap<_, _>>>()?;

                let args = step
                    .args
                    .iter()
                    .enumerate()
                    .map(|(i, a)| table.render(a, &context(format!("arg {}", i))))
                    .collect::<Result<Vec<_>>>()?;

                Ok(JobStep {
                    index,
                    name: step.name.clone(),
                    command_kind: step.command_kind.clone(),
                    workdir: resolve_workdir(&self.job_root, &step.workdir)
                        .ok_or_else(|| Error::InvalidWorkdir {
                            step: step.name.clone(),
                            workdir: step.workdir.clone(),
                        })?,
                    args,
                    env,
                    extra: step.extra.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(JobDescription {
            builder: resolved.name.clone(),
            ancestry: resolved.ancestry.clone(),
            worker: worker.name.clone(),
            image: image.name.clone(),
            tags: resolved.tags.clone(),
            job_root: self.job_root.clone(),
            properties: table.into_map(),
            volumes,
            host_config: resolved.host_config.clone(),
            steps,
        })
    }
}

/// Join a relative step directory onto the job root.
///
/// Returns `None` for absolute directories and for `..` that would leave
/// the root.
pub fn resolve_workdir(job_root: &str, workdir: &str) -> Option<String> {
    if workdir.starts_with('/') {
        return None;
    }
    let mut parts: Vec<&str> = Vec::new();
    for component in workdir.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    let root = job_root.trim_end_matches('/');
    if parts.is_empty() {
        Some(if root.is_empty() { "/".to_string() } else { root.to_string() })
    } else {
        Some(format!("{}/{}", root, parts.join("/")))
    }
}

/// Directory of one builder's jobs under a shared root.
///
/// Returns `None` unless the builder name is a single plain path segment.
pub fn builder_root(job_root: &str, builder: &str) -> Option<String> {
    if builder.contains('/') || matches!(builder, "" | "." | "..") {
        return None;
    }
    resolve_workdir(job_root, builder)
}
