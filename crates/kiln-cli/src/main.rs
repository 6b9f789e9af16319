//! Kiln CI CLI entrypoint.

use anyhow::Context as _;
use clap::Parser;
use std::path::PathBuf;

mod commands;
mod handlers;
mod logging;

use commands::{Commands, OutputFormat};
use handlers::Context;
use kiln_config::KilnSettings;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about = "Kiln CI builder definitions and job planning", long_about = None)]
struct Cli {
    /// Settings file (defaults to ./kiln.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Builder definition file
    #[arg(short, long, global = true)]
    definitions: Option<PathBuf>,

    /// Resource catalog file
    #[arg(short, long, global = true)]
    catalog: Option<PathBuf>,

    /// Job root directory
    #[arg(long, global = true)]
    job_root: Option<String>,

    /// Property override, KEY=VALUE (repeatable)
    #[arg(short = 'P', long = "property", value_parser = parse_property, global = true)]
    properties: Vec<(String, String)>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Command-line flags layered over loaded settings.
    fn apply(&self, mut settings: KilnSettings) -> KilnSettings {
        if let Some(path) = &self.definitions {
            settings.definitions = path.clone();
        }
        if let Some(path) = &self.catalog {
            settings.catalog = path.clone();
        }
        if let Some(root) = &self.job_root {
            settings.job_root = root.clone();
        }
        settings.properties.extend(self.properties.iter().cloned());
        settings
    }
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = KilnSettings::load(cli.config.as_deref()).context("Failed to load settings")?;
    let settings = cli.apply(settings);
    logging::init(&settings.log);

    let ctx = Context::new(settings, cli.output);
    match cli.command {
        Commands::Validate => handlers::validate(&ctx)?,
        Commands::List => handlers::list(&ctx)?,
        Commands::Resolve { builder } => handlers::resolve(&ctx, &builder)?,
        Commands::Match { builder, explain } => handlers::match_builder(&ctx, &builder, explain)?,
        Commands::Plan { builders, all } => handlers::plan(&ctx, builders, all).await?,
        Commands::Schema { kind } => handlers::schema(kind)?,
    }

    Ok(())
}
