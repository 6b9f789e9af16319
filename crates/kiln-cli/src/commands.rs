//! CLI command definitions.

use clap::{Subcommand, ValueEnum};

#[derive(Subcommand)]
pub enum Commands {
    /// Load, check and resolve every builder definition
    Validate,

    /// Show the builder inheritance tree
    List,

    /// Print the flattened definition of a builder
    Resolve {
        /// Builder name
        builder: String,
    },

    /// Show which workers and images a builder can run on
    Match {
        /// Builder name
        builder: String,

        /// Show why rejected resources did not qualify
        #[arg(short, long)]
        explain: bool,
    },

    /// Assemble jobs without running them
    Plan {
        /// Builder names
        builders: Vec<String>,

        /// Plan every builder
        #[arg(short, long, conflicts_with = "builders")]
        all: bool,
    },

    /// Print a JSON schema
    Schema {
        #[arg(value_enum, default_value_t = SchemaKind::Definitions)]
        kind: SchemaKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaKind {
    /// Builder definitions
    Definitions,
    /// Resource catalogs
    Catalog,
    /// Assembled jobs
    Job,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}
