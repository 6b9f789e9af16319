//! Command handlers.

use crate::commands::{OutputFormat, SchemaKind};
use anyhow::{Context as _, bail};
use console::style;
use kiln_config::{AncestryGraph, KilnSettings, StaticCatalog, load_definitions};
use kiln_core::filter::FilterExpr;
use kiln_core::matcher::Rejection;
use kiln_core::ports::CatalogProvider;
use kiln_core::{
    BuilderDefinition, CatalogSnapshot, DefinitionSet, JobDescription, ResourceMatcher, Resolver,
};
use kiln_scheduler::{Dispatch, Dispatcher, DryRunEngine};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Settings plus output preferences shared by every handler.
pub struct Context {
    pub settings: KilnSettings,
    pub output: OutputFormat,
}

impl Context {
    pub fn new(settings: KilnSettings, output: OutputFormat) -> Self {
        Self { settings, output }
    }

    fn definitions(&self) -> anyhow::Result<DefinitionSet> {
        let path = &self.settings.definitions;
        load_definitions(path)
            .with_context(|| format!("Failed to load builder definitions from {}", path.display()))
    }

    fn catalog(&self) -> anyhow::Result<StaticCatalog> {
        let path = &self.settings.catalog;
        StaticCatalog::from_file(path)
            .with_context(|| format!("Failed to load resource catalog from {}", path.display()))
    }

    fn emit<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        print!("{}", render(value, self.output)?);
        Ok(())
    }
}

fn render<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)? + "\n",
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    })
}

/// Load definitions and catalog, then resolve every builder.
pub fn validate(ctx: &Context) -> anyhow::Result<()> {
    let definitions = ctx.definitions()?;
    let resolved = Resolver::new(&definitions)
        .resolve_all()
        .context("Builder definitions do not resolve")?;
    println!(
        "{} {} builders resolve",
        style("✓").green(),
        style(resolved.len()).bold()
    );

    if ctx.settings.catalog.exists() {
        let snapshot = ctx.catalog()?.snapshot()?;
        println!(
            "{} Catalog: {} workers, {} images",
            style("✓").green(),
            snapshot.workers.len(),
            snapshot.images.len()
        );

        let matcher = ResourceMatcher::new();
        for def in &resolved {
            let report = matcher.evaluate(def, &snapshot);
            if report.is_unschedulable() {
                println!(
                    "  {} {} has no eligible worker/image pair",
                    style("!").yellow(),
                    def.name
                );
            }
        }
    } else {
        println!(
            "{} No catalog at {}, skipping match check",
            style("i").blue(),
            ctx.settings.catalog.display()
        );
    }
    Ok(())
}

/// Print the inheritance tree.
pub fn list(ctx: &Context) -> anyhow::Result<()> {
    let definitions = ctx.definitions()?;
    let graph = AncestryGraph::build(&definitions)?;
    for root in graph.roots() {
        print_tree(&graph, &definitions, root.as_str(), 0);
    }
    Ok(())
}

fn print_tree(graph: &AncestryGraph, definitions: &DefinitionSet, name: &str, depth: usize) {
    let description = definitions
        .get(name)
        .and_then(|d| d.description.as_deref())
        .unwrap_or_default();
    println!(
        "{}{} {}",
        "  ".repeat(depth),
        style(name).bold(),
        style(description).dim()
    );
    for child in graph.children(name) {
        print_tree(graph, definitions, child.as_str(), depth + 1);
    }
}

/// Print a flattened definition.
pub fn resolve(ctx: &Context, builder: &str) -> anyhow::Result<()> {
    let definitions = ctx.definitions()?;
    let resolved = Resolver::new(&definitions).resolve(builder)?;
    ctx.emit(&resolved)
}

/// Show eligible resources for one builder.
pub fn match_builder(ctx: &Context, builder: &str, explain: bool) -> anyhow::Result<()> {
    let definitions = ctx.definitions()?;
    let resolved = Resolver::new(&definitions).resolve(builder)?;
    let snapshot = ctx.catalog()?.snapshot()?;
    let report = ResourceMatcher::new().evaluate(&resolved, &snapshot);

    println!("{}", style(&report.builder).bold());
    print_pool(
        "Workers",
        report.worker_filter.as_ref(),
        report.workers.iter().map(|r| r.name.as_str()),
        &report.rejected_workers,
        explain,
    );
    print_pool(
        "Images",
        report.image_filter.as_ref(),
        report.images.iter().map(|r| r.name.as_str()),
        &report.rejected_images,
        explain,
    );

    if report.is_unschedulable() {
        println!("{} No eligible worker/image pair", style("!").yellow());
    } else {
        println!("{} {} eligible pairs", style("✓").green(), report.pair_count());
    }
    Ok(())
}

fn print_pool<'a>(
    label: &str,
    filter: Option<&FilterExpr>,
    eligible: impl Iterator<Item = &'a str>,
    rejected: &[Rejection],
    explain: bool,
) {
    let filter = filter.map_or_else(|| "any".to_string(), |f| f.to_string());
    println!("  {} {}", label, style(filter).dim());
    for name in eligible {
        println!("    {} {}", style("✓").green(), name);
    }
    if explain {
        for rejection in rejected {
            println!("    {} {}", style("✗").red(), rejection.resource);
            for mismatch in &rejection.mismatches {
                println!("        {}", style(mismatch).dim());
            }
        }
    }
}

/// Assemble jobs through a dry-run engine and print them.
pub async fn plan(ctx: &Context, builders: Vec<String>, all: bool) -> anyhow::Result<()> {
    let definitions = Arc::new(ctx.definitions()?);
    let catalog = Arc::new(ctx.catalog()?);
    let engine = Arc::new(DryRunEngine::new());

    let builders: Vec<String> = if all {
        definitions.names().map(|n| n.to_string()).collect()
    } else {
        builders
    };
    if builders.is_empty() {
        bail!("No builders given; name some or pass --all");
    }

    let dispatcher = Dispatcher::new(definitions, catalog, engine.clone())
        .with_job_root(ctx.settings.job_root.as_str())
        .with_properties(ctx.settings.properties.clone());

    let mut failed = 0;
    for (builder, outcome) in dispatcher.dispatch_many(builders.as_slice()).await {
        match outcome {
            Ok(Dispatch::Dispatched { submission, .. }) => {
                debug!(builder = %builder, job_ref = %submission.job_ref, "Planned");
            }
            Ok(Dispatch::Unschedulable(_)) => {
                eprintln!(
                    "{} {} has no eligible worker/image pair",
                    style("!").yellow(),
                    builder
                );
            }
            Err(e) => {
                eprintln!("{} {}: {}", style("✗").red(), builder, e);
                failed += 1;
            }
        }
    }

    let jobs: Vec<JobDescription> = engine.jobs().await;
    ctx.emit(&jobs)?;

    if failed > 0 {
        bail!("{} of {} builders failed to plan", failed, builders.len());
    }
    Ok(())
}

/// Print a JSON schema for one of the file formats.
pub fn schema(kind: SchemaKind) -> anyhow::Result<()> {
    let schema = match kind {
        SchemaKind::Definitions => schemars::schema_for!(BuilderDefinition),
        SchemaKind::Catalog => schemars::schema_for!(CatalogSnapshot),
        SchemaKind::Job => schemars::schema_for!(JobDescription),
    };
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
